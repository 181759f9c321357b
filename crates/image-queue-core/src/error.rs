use crate::TaskStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown filter")]
    UnknownFilter(String),

    #[error("Invalid parameters")]
    InvalidParameters { filter: String, parameter: String },

    #[error("Task already finished with status {0}")]
    AlreadyTerminal(TaskStatus),

    #[error("Status {0} is not terminal")]
    NotTerminal(TaskStatus),

    #[error("Unknown task status: {0}")]
    UnknownStatus(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
