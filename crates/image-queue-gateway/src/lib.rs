pub mod api;
pub mod config;
pub mod metrics;

pub use api::create_router;
pub use config::GatewayConfig;
pub use metrics::GatewayMetrics;

use image_queue_broker::Producer;
use image_queue_persistence::Storage;
use std::sync::Arc;

/// Shared by every request handler
pub struct AppState {
    storage: Arc<dyn Storage>,
    producer: Arc<dyn Producer>,
    metrics: GatewayMetrics,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, producer: Arc<dyn Producer>) -> prometheus::Result<Self> {
        Ok(AppState {
            storage,
            producer,
            metrics: GatewayMetrics::new()?,
        })
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn producer(&self) -> &dyn Producer {
        self.producer.as_ref()
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}
