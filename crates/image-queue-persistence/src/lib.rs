mod storage;
mod memory;
mod repository;
mod sqlite;
mod sessions;

pub use storage::Storage;
pub use memory::MemoryStorage;
pub use repository::{DatabaseStorage, SessionRepository, TaskRepository, UserRepository};
pub use sqlite::{SqliteDatabase, SqliteTaskRepository, SqliteUserRepository};
pub use sessions::{
    MemorySessionRepository, RedisSessionRepository, SessionClaims, DEFAULT_SESSION_TTL_SECS,
};

use image_queue_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Task not found")]
    TaskNotFound(String),

    #[error("Task already exists: {0}")]
    TaskExists(String),

    #[error("User already exists")]
    UserExists(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Task already finished with status {0}")]
    AlreadyTerminal(String),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    CoreError(CoreError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<CoreError> for PersistenceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AlreadyTerminal(status) => {
                PersistenceError::AlreadyTerminal(status.to_string())
            }
            other => PersistenceError::CoreError(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
