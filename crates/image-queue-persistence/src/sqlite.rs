use crate::{PersistenceError, Result, TaskRepository, UserRepository};
use async_trait::async_trait;
use image_queue_core::{CoreError, Task, TaskId, TaskPayload, TaskStatus, User, UserId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id  TEXT PRIMARY KEY,
    login    TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    status  TEXT NOT NULL,
    result  TEXT NOT NULL DEFAULT ''
);
"#;

/// Relational store shared by the task and user repositories
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| {
                        PersistenceError::Other(format!("Failed to create {:?}: {}", parent, e))
                    })?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened SQLite database at {:?}", path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteDatabase {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn task_repository(&self) -> SqliteTaskRepository {
        SqliteTaskRepository { conn: self.conn.clone() }
    }

    pub fn user_repository(&self) -> SqliteUserRepository {
        SqliteUserRepository { conn: self.conn.clone() }
    }
}

pub struct SqliteTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

pub struct SqliteUserRepository {
    conn: Arc<Mutex<Connection>>,
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| PersistenceError::Other(format!("Malformed id {}: {}", value, e)))
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT task_id, user_id, payload, status, result FROM tasks WHERE task_id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let (task_id, user_id, payload, status, result) =
            row.ok_or_else(|| PersistenceError::TaskNotFound(id.to_string()))?;

        Ok(Task {
            id: parse_uuid(&task_id)?,
            user_id: parse_uuid(&user_id)?,
            payload: serde_json::from_str::<TaskPayload>(&payload)?,
            status: status.parse::<TaskStatus>()?,
            result,
        })
    }

    async fn add_task(&self, task: &Task) -> Result<()> {
        let payload = serde_json::to_string(&task.payload)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (task_id, user_id, payload, status, result) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.id.to_string(),
                task.user_id.to_string(),
                payload,
                task.status.as_str(),
                task.result
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                PersistenceError::TaskExists(task.id.to_string())
            } else {
                PersistenceError::from(e)
            }
        })?;

        debug!(task_id = %task.id, "Stored task");
        Ok(())
    }

    /// Unknown ids are logged and dropped rather than reported.
    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: String,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(CoreError::NotTerminal(status).into());
        }

        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, result = ?2 \
             WHERE task_id = ?3 AND status = 'in_progress'",
            params![status.as_str(), result, id.to_string()],
        )?;

        if changed == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM tasks WHERE task_id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            match current {
                Some(current) => return Err(PersistenceError::AlreadyTerminal(current)),
                None => {
                    error!(task_id = %id, "Error updating task: task does not exist");
                    return Ok(());
                }
            }
        }

        debug!(task_id = %id, status = %status, "Updated task status");
        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn add_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (user_id, login, password) VALUES (?1, ?2, ?3)",
            params![user.id.to_string(), user.login, user.password],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                PersistenceError::UserExists(user.login.clone())
            } else {
                PersistenceError::from(e)
            }
        })?;
        Ok(())
    }

    /// Does not reveal whether the login or the password was wrong.
    async fn validate_credentials(&self, login: &str, password: &str) -> Result<UserId> {
        let conn = self.conn.lock().await;
        let saved: Option<(String, String)> = conn
            .query_row(
                "SELECT user_id, password FROM users WHERE login = ?1",
                params![login],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match saved {
            Some((user_id, saved_password)) if saved_password == password => parse_uuid(&user_id),
            _ => Err(PersistenceError::InvalidCredentials(
                "Wrong username or password".to_string(),
            )),
        }
    }
}
