use crate::{process, Outcome, ProcessingError, ReportError, Reporter};
use futures::StreamExt;
use image_queue_broker::{BrokerError, Consumer, Delivery};
use image_queue_core::{Task, TaskId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Broker error: {0}")]
    BrokerError(#[from] BrokerError),

    #[error("Task {0} vanished from storage")]
    MissingTask(TaskId),
}

/// Sequential consumer: one delivery at a time, acked after its outcome is reported
pub struct Worker {
    consumer: Arc<dyn Consumer>,
    reporter: Arc<dyn Reporter>,
    shutdown: Arc<Notify>,
    processed: AtomicU64,
}

impl Worker {
    pub fn new(consumer: Arc<dyn Consumer>, reporter: Arc<dyn Reporter>) -> Self {
        Worker {
            consumer,
            reporter,
            shutdown: Arc::new(Notify::new()),
            processed: AtomicU64::new(0),
        }
    }

    /// Handle that stops `run` when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Tasks handled since start
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Consume until shutdown, the stream ends, or a fatal report error
    pub async fn run(&self) -> Result<(), WorkerError> {
        let mut deliveries = self.consumer.consume().await?;
        info!("Worker waiting for tasks");

        loop {
            let next = tokio::select! {
                next = deliveries.next() => next,
                _ = self.shutdown.notified() => {
                    info!("Worker shutting down");
                    break;
                }
            };

            match next {
                Some(Ok(delivery)) => self.handle_delivery(delivery).await?,
                Some(Err(e)) => {
                    error!("Failed to receive delivery: {}", e);
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                }
                None => {
                    warn!("Delivery stream closed");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), WorkerError> {
        let task = match delivery.task() {
            Ok(task) => task,
            Err(e) => {
                error!("Dropping unreadable delivery: {}", e);
                ack(delivery).await;
                return Ok(());
            }
        };

        let task_id = task.id;
        let filter = task.payload.filter.name.clone();
        info!(task_id = %task_id, filter = %filter, "Processing task");

        let started = Instant::now();
        let outcome = run_blocking(task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(task_id = %task_id, elapsed_ms, "Pipeline finished");

        let reported = self.reporter.report(task_id, &outcome).await;
        ack(delivery).await;
        self.processed.fetch_add(1, Ordering::Relaxed);

        match reported {
            Ok(()) => {
                info!(task_id = %task_id, status = %outcome.status, "Task finished");
                Ok(())
            }
            Err(ReportError::MissingTask(id)) => {
                error!(task_id = %id, "Task is missing from storage, stopping worker");
                Err(WorkerError::MissingTask(id))
            }
            Err(ReportError::AlreadyFinished(id)) => {
                warn!(task_id = %id, "Task was already finished, ignoring redelivery");
                Ok(())
            }
            Err(e) => {
                error!(task_id = %task_id, "Failed to report outcome: {}", e);
                Ok(())
            }
        }
    }
}

async fn run_blocking(task: Task) -> Outcome {
    let task_id = task.id;
    match tokio::task::spawn_blocking(move || process(&task.payload)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(task_id = %task_id, "Processing task died: {}", e);
            Outcome::failed(ProcessingError::Panicked)
        }
    }
}

async fn ack(delivery: Delivery) {
    if let Err(e) = delivery.ack().await {
        error!("Failed to acknowledge delivery: {}", e);
    }
}
