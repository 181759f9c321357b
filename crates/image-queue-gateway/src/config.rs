use image_queue_broker::RedisBrokerConfig;
use image_queue_core::DEFAULT_QUEUE_NAME;
use image_queue_persistence::DEFAULT_SESSION_TTL_SECS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest accepted request body; base64 inflates images by a third
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub broker: BrokerConfig,
    pub worker: EmbeddedWorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
    /// Session store; sessions stay in process memory when unset
    pub redis_url: Option<String>,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
    pub redis_url: String,
    pub queue_name: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedWorkerConfig {
    /// Run a worker loop inside the gateway process
    pub embedded: bool,
    pub consumer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("./data/image-queue.db"),
            redis_url: None,
            jwt_secret: String::new(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            backend: BrokerBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            poll_interval_ms: 200,
        }
    }
}

impl Default for EmbeddedWorkerConfig {
    fn default() -> Self {
        EmbeddedWorkerConfig {
            embedded: true,
            consumer_name: "gateway".to_string(),
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

impl GatewayConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatewayConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn redis_broker(&self) -> RedisBrokerConfig {
        RedisBrokerConfig {
            redis_url: self.broker.redis_url.clone(),
            queue_name: self.broker.queue_name.clone(),
            consumer_name: self.worker.consumer_name.clone(),
            poll_interval: Duration::from_millis(self.broker.poll_interval_ms),
        }
    }
}
