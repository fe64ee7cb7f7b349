//! Error types shared across the scheduler.

use std::time::Duration;

use crate::job::JobId;

/// Errors returned to callers of the job queue.
///
/// Running out of capacity is not represented here: it only delays a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("No worker bound to job {0}")]
    WorkerNotBound(JobId),

    #[error("Job {0} is already leaving")]
    AlreadyLeaving(JobId),

    #[error("Worker action failed: {0}")]
    Action(#[from] WorkerError),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Scheduler failed to start: {0}")]
    Startup(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Scheduler is not running")]
    Stopped,
}

/// Failures reported by worker collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker setup failed: {0}")]
    Setup(String),

    #[error("Join failed: {0}")]
    Join(String),

    #[error("Recording failed: {0}")]
    Recording(String),

    #[error("Leave failed: {0}")]
    Leave(String),

    #[error("Session export failed: {0}")]
    Session(String),

    #[error("Substrate failure: {0}")]
    Substrate(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures of a persisted-session backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Session store backend error: {0}")]
    Backend(String),

    #[error("Malformed session state: {0}")]
    Malformed(String),
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
