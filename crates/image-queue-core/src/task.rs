use crate::{CoreError, FilterSpec, Result, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted and waiting for (or undergoing) processing
    InProgress,
    /// Processed successfully, result holds the encoded image
    Ready,
    /// Processing failed, result holds the reason
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Ready => "ready",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(TaskStatus::InProgress),
            "ready" => Ok(TaskStatus::Ready),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// What the client asked for: a filter and the base64-encoded source image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub filter: FilterSpec,
    pub image: String,
}

/// A unit of image work, as stored and as published on the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: TaskId,

    pub user_id: UserId,

    pub payload: TaskPayload,

    pub status: TaskStatus,

    /// Base64 output image once ready, failure reason once failed, empty before
    #[serde(default)]
    pub result: String,
}

impl Task {
    /// Create a new in-progress task owned by `user_id`
    pub fn new(user_id: UserId, payload: TaskPayload) -> Self {
        Task {
            id: Uuid::new_v4(),
            user_id,
            payload,
            status: TaskStatus::InProgress,
            result: String::new(),
        }
    }

    /// Move the task into a terminal state. Only one transition is allowed.
    pub fn finish(&mut self, status: TaskStatus, result: String) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal(self.status));
        }
        if !status.is_terminal() {
            return Err(CoreError::NotTerminal(status));
        }
        self.status = status;
        self.result = result;
        Ok(())
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.user_id == *user_id
    }

    /// Serialize to the JSON queue message
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CoreError::from)
    }

    /// Deserialize from a JSON queue message
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(CoreError::from)
    }
}
