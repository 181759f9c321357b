use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use image_queue_core::Task;
use std::fmt;

/// Lazy, unbounded sequence of deliveries
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Confirms to the queue that one delivery has been handled
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;
}

/// One message handed to a consumer
pub struct Delivery {
    body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Delivery { body, acker }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decode the JSON task carried by this delivery
    pub fn task(&self) -> Result<Task> {
        Ok(Task::from_json_bytes(&self.body)?)
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .finish()
    }
}
