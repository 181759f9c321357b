use crate::{Acknowledger, Consumer, Delivery, DeliveryStream, Producer, Result};
use async_trait::async_trait;
use futures::StreamExt;
use image_queue_core::Task;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// FIFO of serialized tasks shared by producers and consumer sessions
struct SharedQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
    ready: Notify,
}

impl SharedQueue {
    fn push_back(&self, body: Vec<u8>) {
        self.messages.lock().push_back(body);
        self.ready.notify_one();
    }

    /// Wait until a message is available and take it
    async fn next(&self) -> Vec<u8> {
        loop {
            {
                let mut messages = self.messages.lock();
                if let Some(body) = messages.pop_front() {
                    if !messages.is_empty() {
                        // let another waiting session pick up the rest
                        self.ready.notify_one();
                    }
                    return body;
                }
            }
            self.ready.notified().await;
        }
    }
}

/// In-process broker for tests and single-process deployments.
///
/// Each `consume()` call opens a session. Deliveries that session has not
/// acknowledged go back to the head of the queue once the stream and all of
/// its deliveries are dropped.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<SharedQueue>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker {
            shared: Arc::new(SharedQueue {
                messages: Mutex::new(VecDeque::new()),
                ready: Notify::new(),
            }),
        }
    }

    /// Messages waiting to be delivered (excludes unacknowledged in-flight ones)
    pub fn len(&self) -> usize {
        self.shared.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a raw message body
    pub fn push_raw(&self, body: Vec<u8>) {
        self.shared.push_back(body);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for MemoryBroker {
    async fn publish(&self, task: &Task) -> Result<()> {
        let body = task.to_json_bytes()?;
        self.shared.push_back(body);
        debug!(task_id = %task.id, "Published task");
        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryBroker {
    async fn consume(&self) -> Result<DeliveryStream> {
        let session = Arc::new(ConsumerSession {
            shared: self.shared.clone(),
            unacked: Mutex::new(BTreeMap::new()),
            next_tag: AtomicU64::new(0),
        });

        let stream = futures::stream::unfold(session, |session| async move {
            let body = session.shared.next().await;
            let tag = session.next_tag.fetch_add(1, Ordering::SeqCst);
            session.unacked.lock().insert(tag, body.clone());

            let acker = MemoryAcker {
                session: session.clone(),
                tag,
            };
            Some((Ok(Delivery::new(body, Box::new(acker))), session))
        });

        Ok(stream.boxed())
    }
}

struct ConsumerSession {
    shared: Arc<SharedQueue>,
    unacked: Mutex<BTreeMap<u64, Vec<u8>>>,
    next_tag: AtomicU64,
}

impl Drop for ConsumerSession {
    fn drop(&mut self) {
        let unacked = std::mem::take(&mut *self.unacked.lock());
        if unacked.is_empty() {
            return;
        }

        debug!("Requeueing {} unacknowledged deliveries", unacked.len());
        {
            let mut messages = self.shared.messages.lock();
            // oldest delivery ends up first
            for (_, body) in unacked.into_iter().rev() {
                messages.push_front(body);
            }
        }
        self.shared.ready.notify_one();
    }
}

struct MemoryAcker {
    session: Arc<ConsumerSession>,
    tag: u64,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.session.unacked.lock().remove(&self.tag);
        Ok(())
    }
}
