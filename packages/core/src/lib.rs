//! Core domain types for the meeting attendance scheduler.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and JobRequest for attendance requests
//! - Capacity and QueueSnapshot for read-only views
//! - Events for lifecycle observers
//! - Collaborator contracts for workers and session persistence

mod config;
mod error;
mod events;
mod job;
mod queue;
mod worker;

pub use config::SchedulerConfig;
pub use error::{ConfigError, SchedulerError, StoreError, WorkerError};
pub use events::JobEvent;
pub use job::{Job, JobId, JobRequest, JobStatus};
pub use queue::{Capacity, QueueSnapshot, QueueStats};
pub use worker::{
    ExecutionMode, SessionState, SessionStore, Substrate, Worker, WorkerFactory, WorkerFuture,
};
