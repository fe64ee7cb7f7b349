//! Event types for lifecycle observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Capacity, ExecutionMode, Job, JobId};

/// Events emitted by the job queue as jobs and the pool change state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was accepted and queued.
    JobSubmitted { job: Job, timestamp: DateTime<Utc> },
    /// A worker was bound and the driver started.
    JobStarted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// The driver reported a successful join.
    JobActive {
        job_id: JobId,
        recording: bool,
        timestamp: DateTime<Utc>,
    },
    /// The job ended normally.
    JobCompleted {
        job_id: JobId,
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    /// The job ended with an error.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Recording was stopped on request.
    RecordingStopped {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// The substrate was rebuilt; bound jobs were failed.
    PoolReinitialized {
        mode: ExecutionMode,
        orphaned: Vec<JobId>,
        timestamp: DateTime<Utc>,
    },
    /// A slot was taken or freed.
    CapacityChanged {
        capacity: Capacity,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobSubmitted { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobActive { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::RecordingStopped { timestamp, .. } => *timestamp,
            JobEvent::PoolReinitialized { timestamp, .. } => *timestamp,
            JobEvent::CapacityChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobSubmitted { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobActive { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::RecordingStopped { job_id, .. } => Some(*job_id),
            JobEvent::PoolReinitialized { .. } | JobEvent::CapacityChanged { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobSubmitted { job, .. } => match job.scheduled_at {
                Some(at) => format!("Job {} queued for {}", job.id, at.to_rfc3339()),
                None => format!("Job {} queued", job.id),
            },
            JobEvent::JobStarted { job_id, .. } => format!("Job {} started", job_id),
            JobEvent::JobActive {
                job_id, recording, ..
            } => {
                let recording = if *recording { " (recording)" } else { "" };
                format!("Job {} active{}", job_id, recording)
            }
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => match duration_ms {
                Some(ms) => format!("Job {} completed after {}ms", job_id, ms),
                None => format!("Job {} completed", job_id),
            },
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::RecordingStopped { job_id, .. } => {
                format!("Job {} stopped recording", job_id)
            }
            JobEvent::PoolReinitialized { mode, orphaned, .. } => format!(
                "Worker pool reinitialized ({}), {} job(s) failed",
                mode,
                orphaned.len()
            ),
            JobEvent::CapacityChanged { capacity, .. } => {
                format!("Capacity {}/{}", capacity.active, capacity.max)
            }
        }
    }
}
