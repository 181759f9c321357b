use crate::{Result, Storage};
use async_trait::async_trait;
use image_queue_core::{Task, TaskId, TaskStatus, User, UserId};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_task(&self, id: TaskId) -> Result<Task>;
    async fn add_task(&self, task: &Task) -> Result<()>;
    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: String,
    ) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn add_user(&self, user: &User) -> Result<()>;
    async fn validate_credentials(&self, login: &str, password: &str) -> Result<UserId>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, user_id: UserId) -> Result<String>;
    async fn resolve_session(&self, token: &str) -> Result<UserId>;
}

/// Persistent storage assembled from three independent repositories.
///
/// Each repository owns its own datastore. Nothing here spans more than one
/// of them, so there are no cross-repository transactions.
pub struct DatabaseStorage<T, U, S> {
    tasks: T,
    users: U,
    sessions: S,
}

impl<T, U, S> DatabaseStorage<T, U, S>
where
    T: TaskRepository,
    U: UserRepository,
    S: SessionRepository,
{
    pub fn new(tasks: T, users: U, sessions: S) -> Self {
        DatabaseStorage { tasks, users, sessions }
    }
}

#[async_trait]
impl<T, U, S> Storage for DatabaseStorage<T, U, S>
where
    T: TaskRepository,
    U: UserRepository,
    S: SessionRepository,
{
    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.tasks.get_task(id).await
    }

    async fn add_task(&self, task: &Task) -> Result<()> {
        self.tasks.add_task(task).await
    }

    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: String,
    ) -> Result<()> {
        self.tasks.update_task_status(id, status, result).await
    }

    async fn add_user(&self, user: &User) -> Result<()> {
        self.users.add_user(user).await
    }

    async fn validate_credentials(&self, login: &str, password: &str) -> Result<UserId> {
        self.users.validate_credentials(login, password).await
    }

    async fn create_session(&self, user_id: UserId) -> Result<String> {
        self.sessions.create_session(user_id).await
    }

    async fn resolve_session(&self, token: &str) -> Result<UserId> {
        self.sessions.resolve_session(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MemorySessionRepository, PersistenceError, SqliteDatabase, SqliteTaskRepository,
        SqliteUserRepository,
    };
    use image_queue_core::{FilterSpec, TaskPayload};

    type SqliteStorage =
        DatabaseStorage<SqliteTaskRepository, SqliteUserRepository, MemorySessionRepository>;

    async fn storage() -> SqliteStorage {
        let db = SqliteDatabase::open_in_memory().unwrap();
        DatabaseStorage::new(
            db.task_repository(),
            db.user_repository(),
            MemorySessionRepository::unbounded(),
        )
    }

    #[tokio::test]
    async fn test_login_flow_through_composite() {
        let storage = storage().await;
        let user = User::new("erin", "pw");
        storage.add_user(&user).await.unwrap();

        let token = storage.login("erin", "pw").await.unwrap();
        assert_eq!(storage.resolve_session(&token).await.unwrap(), user.id);

        assert!(matches!(
            storage.login("erin", "bad").await,
            Err(PersistenceError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_task_flow_through_composite() {
        let storage = storage().await;
        let task = Task::new(
            uuid::Uuid::new_v4(),
            TaskPayload {
                filter: FilterSpec::new("Blur").with_parameter("sigma", 1.5),
                image: "AAAA".to_string(),
            },
        );
        storage.add_task(&task).await.unwrap();
        storage
            .update_task_status(task.id, TaskStatus::Failed, "Failed to decode image".to_string())
            .await
            .unwrap();

        let stored = storage.get_task(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.result, "Failed to decode image");
        assert_eq!(stored.payload, task.payload);
    }
}
