use image_queue_broker::RedisBrokerConfig;
use image_queue_core::DEFAULT_QUEUE_NAME;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker: BrokerSection,
    pub report: ReportSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub redis_url: String,
    pub queue_name: String,
    pub consumer_name: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// POST outcomes to the gateway's commit endpoint
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub mode: ReportMode,
    pub gateway_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for BrokerSection {
    fn default() -> Self {
        BrokerSection {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            consumer_name: "worker-1".to_string(),
            poll_interval_ms: 200,
        }
    }
}

impl Default for ReportSection {
    fn default() -> Self {
        ReportSection {
            mode: ReportMode::Commit,
            gateway_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn redis_broker(&self) -> RedisBrokerConfig {
        RedisBrokerConfig {
            redis_url: self.broker.redis_url.clone(),
            queue_name: self.broker.queue_name.clone(),
            consumer_name: self.broker.consumer_name.clone(),
            poll_interval: Duration::from_millis(self.broker.poll_interval_ms),
        }
    }
}
