//! Actor system for the meeting job queue.
//!
//! This crate provides the Ractor-based queue actor that schedules jobs onto
//! a bounded pool of workers.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns the job history, dispatches ready jobs and arms
//!   deferred timers for scheduled ones
//! - `ResourcePool` - Gates worker creation to `max_concurrent` and binds
//!   each worker to exactly one job
//! - `JobDriver` - Runs a job on its worker in a separate task and reports
//!   back through messages
//!
//! # Usage
//!
//! ```ignore
//! use actors::{QueueArgs, start_scheduler};
//! use attendant_core::{JobRequest, SchedulerConfig};
//!
//! let args = QueueArgs::new(SchedulerConfig::default(), factory, sessions);
//! let (queue, _handle) = start_scheduler(args).await?;
//!
//! let job = queue.submit(JobRequest::new("https://meet.example/abc")).await?;
//! ```

mod driver;
mod messages;
mod pool;
mod queue_actor;
mod scheduler;
mod timers;

pub use driver::{DriverFuture, DriverHandle, JobDriver, MeetingDriver};
pub use messages::QueueMessage;
pub use pool::{PoolError, ResourcePool};
pub use queue_actor::{QueueActor, QueueActorState, QueueArgs};
pub use scheduler::{JobQueueHandle, start_scheduler};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
