use image_queue_core::TaskStatus;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Prometheus metrics for the gateway
pub struct GatewayMetrics {
    pub registry: Registry,

    pub registrations_total: IntCounter,
    pub logins_total: IntCounter,

    // Accepted by POST /task, including ones rejected by filter validation
    pub tasks_submitted_total: IntCounter,
    pub tasks_rejected_total: IntCounterVec,

    pub commits_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let registrations_total =
            IntCounter::new("iq_registrations_total", "Number of registered users")?;
        registry.register(Box::new(registrations_total.clone()))?;

        let logins_total = IntCounter::new("iq_logins_total", "Number of successful logins")?;
        registry.register(Box::new(logins_total.clone()))?;

        let tasks_submitted_total =
            IntCounter::new("iq_tasks_submitted_total", "Number of created tasks")?;
        registry.register(Box::new(tasks_submitted_total.clone()))?;

        let tasks_rejected_total = IntCounterVec::new(
            Opts::new("iq_tasks_rejected_total", "Tasks failed before reaching the queue"),
            &["reason"],
        )?;
        registry.register(Box::new(tasks_rejected_total.clone()))?;

        let commits_total = IntCounterVec::new(
            Opts::new("iq_commits_total", "Task outcomes committed by workers"),
            &["status"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        Ok(GatewayMetrics {
            registry,
            registrations_total,
            logins_total,
            tasks_submitted_total,
            tasks_rejected_total,
            commits_total,
        })
    }

    pub fn inc_rejected(&self, reason: &str) {
        self.tasks_rejected_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_commits(&self, status: TaskStatus) {
        self.commits_total.with_label_values(&[status.as_str()]).inc();
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
