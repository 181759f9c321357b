mod task;
mod filter;
mod user;
mod error;

pub use task::{Task, TaskId, TaskPayload, TaskStatus};
pub use filter::{Filter, FilterSpec, SIGMA_PARAMETER};
pub use user::{User, UserId};
pub use error::{CoreError, Result};

/// Name of the queue tasks are published on unless configured otherwise.
pub const DEFAULT_QUEUE_NAME: &str = "task_queue";
