use crate::Outcome;
use async_trait::async_trait;
use image_queue_client::{ClientError, GatewayClient};
use image_queue_core::TaskId;
use image_queue_persistence::{PersistenceError, Storage};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Task {0} does not exist in storage")]
    MissingTask(TaskId),

    #[error("Task {0} was already finished")]
    AlreadyFinished(TaskId),

    #[error("Storage error: {0}")]
    StorageError(PersistenceError),

    #[error("Commit failed: {0}")]
    CommitError(ClientError),
}

/// Writes a task's terminal state back to where the gateway can read it
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, task_id: TaskId, outcome: &Outcome) -> Result<(), ReportError>;
}

/// Updates storage directly; used when the worker shares the gateway's process
pub struct StorageReporter {
    storage: Arc<dyn Storage>,
}

impl StorageReporter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        StorageReporter { storage }
    }
}

#[async_trait]
impl Reporter for StorageReporter {
    async fn report(&self, task_id: TaskId, outcome: &Outcome) -> Result<(), ReportError> {
        self.storage
            .update_task_status(task_id, outcome.status, outcome.result.clone())
            .await
            .map_err(|err| match err {
                PersistenceError::TaskNotFound(_) => ReportError::MissingTask(task_id),
                PersistenceError::AlreadyTerminal(_) => ReportError::AlreadyFinished(task_id),
                other => ReportError::StorageError(other),
            })
    }
}

/// Sends outcomes to the gateway's commit endpoint
pub struct CommitReporter {
    client: GatewayClient,
}

impl CommitReporter {
    pub fn new(client: GatewayClient) -> Self {
        CommitReporter { client }
    }
}

#[async_trait]
impl Reporter for CommitReporter {
    async fn report(&self, task_id: TaskId, outcome: &Outcome) -> Result<(), ReportError> {
        // a 404 from the gateway is not fatal for a remote worker
        self.client
            .commit(task_id, outcome.status, &outcome.result)
            .await
            .map_err(|err| match err {
                ClientError::Conflict(_) => ReportError::AlreadyFinished(task_id),
                other => ReportError::CommitError(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessingError;
    use image_queue_core::{FilterSpec, Task, TaskPayload, TaskStatus};
    use image_queue_persistence::MemoryStorage;
    use uuid::Uuid;

    fn task() -> Task {
        Task::new(
            Uuid::new_v4(),
            TaskPayload {
                filter: FilterSpec::new("Grayscale"),
                image: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_storage_reporter_updates_task() {
        let storage = Arc::new(MemoryStorage::new());
        let task = task();
        storage.add_task(&task).await.unwrap();

        let reporter = StorageReporter::new(storage.clone());
        reporter
            .report(task.id, &Outcome::failed(ProcessingError::UnknownFilter))
            .await
            .unwrap();

        let stored = storage.get_task(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.result, "Unknown filter");
    }

    #[tokio::test]
    async fn test_storage_reporter_classifies_errors() {
        let storage = Arc::new(MemoryStorage::new());
        let reporter = StorageReporter::new(storage.clone());
        let missing = Uuid::new_v4();

        assert!(matches!(
            reporter.report(missing, &Outcome::ready("x".to_string())).await,
            Err(ReportError::MissingTask(id)) if id == missing
        ));

        let task = task();
        storage.add_task(&task).await.unwrap();
        reporter.report(task.id, &Outcome::ready("x".to_string())).await.unwrap();
        assert!(matches!(
            reporter.report(task.id, &Outcome::ready("y".to_string())).await,
            Err(ReportError::AlreadyFinished(_))
        ));
    }
}
