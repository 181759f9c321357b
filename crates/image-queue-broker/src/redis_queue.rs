use crate::{Acknowledger, Consumer, Delivery, DeliveryStream, Producer, Result};
use async_trait::async_trait;
use futures::StreamExt;
use image_queue_core::{Task, DEFAULT_QUEUE_NAME};
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    pub redis_url: String,
    pub queue_name: String,
    /// Stable consumer name; its processing list survives restarts so
    /// in-flight deliveries can be recovered
    pub consumer_name: String,
    pub poll_interval: Duration,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        RedisBrokerConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            consumer_name: "default".to_string(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl RedisBrokerConfig {
    fn processing_key(&self) -> String {
        format!("{}:processing:{}", self.queue_name, self.consumer_name)
    }
}

/// Durable FIFO on a Redis list.
///
/// Producers `LPUSH` onto the queue. A consumer atomically moves the oldest
/// message into its own processing list and removes it from there on ack.
/// Whatever is still in the processing list when a consumer starts is put back
/// at the head of the queue, which gives redelivery after a disconnect.
pub struct RedisBroker {
    connection: MultiplexedConnection,
    config: RedisBrokerConfig,
}

impl RedisBroker {
    pub async fn connect(config: RedisBrokerConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut connection).await?;
        info!("Connected to queue {} at {}", config.queue_name, config.redis_url);

        Ok(RedisBroker { connection, config })
    }

    /// Move unacknowledged deliveries of a previous session back to the queue
    async fn recover_in_flight(&self, conn: &mut MultiplexedConnection) -> Result<usize> {
        let processing = self.config.processing_key();
        let mut recovered = 0;
        loop {
            let moved: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(&self.config.queue_name)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[async_trait]
impl Producer for RedisBroker {
    async fn publish(&self, task: &Task) -> Result<()> {
        let body = task.to_json_bytes()?;
        let mut conn = self.connection.clone();
        redis::cmd("LPUSH")
            .arg(&self.config.queue_name)
            .arg(body)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(task_id = %task.id, "Published task");
        Ok(())
    }
}

struct PollState {
    connection: MultiplexedConnection,
    queue: String,
    processing: String,
    poll_interval: Duration,
}

#[async_trait]
impl Consumer for RedisBroker {
    async fn consume(&self) -> Result<DeliveryStream> {
        let mut conn = self.connection.clone();
        let recovered = self.recover_in_flight(&mut conn).await?;
        if recovered > 0 {
            warn!("Requeued {} unacknowledged deliveries from a previous session", recovered);
        }

        let state = PollState {
            connection: conn,
            queue: self.config.queue_name.clone(),
            processing: self.config.processing_key(),
            poll_interval: self.config.poll_interval,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                let moved: redis::RedisResult<Option<Vec<u8>>> = redis::cmd("LMOVE")
                    .arg(&state.queue)
                    .arg(&state.processing)
                    .arg("RIGHT")
                    .arg("LEFT")
                    .query_async(&mut state.connection)
                    .await;

                match moved {
                    Ok(Some(body)) => {
                        let acker = RedisAcker {
                            connection: state.connection.clone(),
                            processing: state.processing.clone(),
                            body: body.clone(),
                        };
                        return Some((Ok(Delivery::new(body, Box::new(acker))), state));
                    }
                    Ok(None) => tokio::time::sleep(state.poll_interval).await,
                    Err(e) => return Some((Err(e.into()), state)),
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct RedisAcker {
    connection: MultiplexedConnection,
    processing: String,
    body: Vec<u8>,
}

#[async_trait]
impl Acknowledger for RedisAcker {
    async fn ack(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&self.body)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
