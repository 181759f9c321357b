mod delivery;
mod memory;
mod redis_queue;

pub use delivery::{Acknowledger, Delivery, DeliveryStream};
pub use memory::MemoryBroker;
pub use redis_queue::{RedisBroker, RedisBrokerConfig};

use async_trait::async_trait;
use image_queue_core::{CoreError, Task};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] CoreError),

    #[error("Broker closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Publishing side of the task queue
#[async_trait]
pub trait Producer: Send + Sync {
    /// Enqueue a task. Delivery is at-least-once; publishing twice delivers twice.
    async fn publish(&self, task: &Task) -> Result<()>;
}

/// Consuming side of the task queue
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Open a delivery stream. It never ends on its own; every delivery must
    /// be acknowledged, otherwise it comes back once the stream is dropped.
    async fn consume(&self) -> Result<DeliveryStream>;
}
