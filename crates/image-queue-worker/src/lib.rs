pub mod config;
pub mod filters;
pub mod processor;
pub mod reporter;
pub mod worker;

pub use config::WorkerConfig;
pub use processor::{process, Outcome, ProcessingError};
pub use reporter::{CommitReporter, ReportError, Reporter, StorageReporter};
pub use worker::{Worker, WorkerError};
