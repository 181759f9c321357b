use crate::Result;
use async_trait::async_trait;
use image_queue_core::{Task, TaskId, TaskStatus, User, UserId};

/// Everything the gateway and the worker need from persistence.
///
/// Implementations must be safe to share between concurrently running
/// request handlers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a task by id
    async fn get_task(&self, id: TaskId) -> Result<Task>;

    /// Insert a new task; fails with `TaskExists` if the id is taken
    async fn add_task(&self, task: &Task) -> Result<()>;

    /// Move an in-progress task into its terminal state.
    ///
    /// The task must already exist. How a missing task is reported depends on
    /// the backend; a finished task always yields `AlreadyTerminal`.
    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: String,
    ) -> Result<()>;

    /// Register a user; fails with `UserExists` if the login is taken
    async fn add_user(&self, user: &User) -> Result<()>;

    /// Exact-match credential check, returns the user's id
    async fn validate_credentials(&self, login: &str, password: &str) -> Result<UserId>;

    /// Issue a new session token for `user_id`
    async fn create_session(&self, user_id: UserId) -> Result<String>;

    /// Map a session token back to its user
    async fn resolve_session(&self, token: &str) -> Result<UserId>;

    /// Validate credentials and open a session in one step
    async fn login(&self, login: &str, password: &str) -> Result<String> {
        let user_id = self.validate_credentials(login, password).await?;
        self.create_session(user_id).await
    }
}
