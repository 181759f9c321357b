use crate::{PersistenceError, Result, Storage};
use async_trait::async_trait;
use image_queue_core::{Task, TaskId, TaskStatus, User, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Volatile storage: everything lives in process memory and is lost on restart.
///
/// Sessions never expire. Login failures say whether the user is unknown or
/// the password is wrong.
pub struct MemoryStorage {
    tasks: RwLock<HashMap<TaskId, Task>>,
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, UserId>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            tasks: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistenceError::TaskNotFound(id.to_string()))
    }

    async fn add_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(PersistenceError::TaskExists(task.id.to_string()));
        }
        tasks.insert(task.id, task.clone());
        debug!(task_id = %task.id, "Stored task");
        Ok(())
    }

    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: String,
    ) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::TaskNotFound(id.to_string()))?;
        task.finish(status, result)?;
        debug!(task_id = %id, status = %status, "Updated task status");
        Ok(())
    }

    async fn add_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write();
        if users.contains_key(&user.login) {
            return Err(PersistenceError::UserExists(user.login.clone()));
        }
        users.insert(user.login.clone(), user.clone());
        Ok(())
    }

    async fn validate_credentials(&self, login: &str, password: &str) -> Result<UserId> {
        let users = self.users.read();
        let saved = users
            .get(login)
            .ok_or_else(|| {
                PersistenceError::InvalidCredentials("Username doesn't exist".to_string())
            })?;
        if saved.password != password {
            return Err(PersistenceError::InvalidCredentials(
                "Wrong username or password".to_string(),
            ));
        }
        Ok(saved.id)
    }

    async fn create_session(&self, user_id: UserId) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().insert(token.clone(), user_id);
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> Result<UserId> {
        self.sessions
            .read()
            .get(token)
            .copied()
            .ok_or(PersistenceError::InvalidSession)
    }
}
