//! Job domain types for meeting-attendance requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::SchedulerError;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
///
/// ```text
/// Queued -> Processing -> Active -> Completed
///    |          |           |
///    +----------+-----------+----> Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its scheduled time or for a free slot.
    #[default]
    Queued,
    /// A worker is bound and the driver is joining.
    Processing,
    /// The worker reported a successful join.
    Active,
    /// The job ended normally and its slot was released.
    Completed,
    /// The job ended with an error and its slot was released.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if a worker may currently be bound to the job.
    pub fn holds_slot(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Active)
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits. Validated before a [`Job`] is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Locator of the meeting to join.
    pub target: String,
    /// Whether to start recording once joined.
    #[serde(default)]
    pub wants_recording: bool,
    /// Earliest time the job may start. Absent means ready immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl JobRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            wants_recording: false,
            scheduled_at: None,
        }
    }

    /// Request recording once the meeting is joined.
    pub fn with_recording(mut self, wants_recording: bool) -> Self {
        self.wants_recording = wants_recording;
        self
    }

    /// Defer the job until the given time.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Reject blank targets and scheduled times further than `grace` in the past.
    pub fn validate(&self, now: DateTime<Utc>, grace: Duration) -> Result<(), SchedulerError> {
        if self.target.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "target must not be empty".into(),
            ));
        }

        if let Some(at) = self.scheduled_at
            && at < now - grace
        {
            return Err(SchedulerError::InvalidRequest(format!(
                "scheduled time {} is in the past",
                at.to_rfc3339()
            )));
        }

        Ok(())
    }
}

/// A request to occupy one worker for the duration of a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Locator of the meeting to join.
    pub target: String,
    /// Recording preference given at submission.
    pub wants_recording: bool,
    /// Earliest time the job may start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: JobStatus,
    /// Failure reason, only set when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the worker reported an active recording.
    #[serde(default)]
    pub recording: bool,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When a worker was bound to the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job from a validated request.
    pub fn new(request: JobRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            target: request.target,
            wants_recording: request.wants_recording,
            scheduled_at: request.scheduled_at,
            status: JobStatus::Queued,
            error: None,
            recording: false,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// A queued job is ready once its scheduled time (if any) has passed.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// The scheduled time of a queued job that is not ready yet.
    pub fn deferred_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.scheduled_at {
            Some(at) if self.status == JobStatus::Queued && at > now => Some(at),
            _ => None,
        }
    }

    /// `Queued -> Processing`. Returns false if the job was not queued.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(self.clamp(now));
        true
    }

    /// `Processing -> Active`. Ignored unless the job is processing.
    pub fn activate(&mut self, recording: bool) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.status = JobStatus::Active;
        self.recording = recording;
        true
    }

    /// Move to `Completed` (no error) or `Failed`. Ignored once terminal.
    pub fn finish(&mut self, now: DateTime<Utc>, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = match error {
            Some(_) => JobStatus::Failed,
            None => JobStatus::Completed,
        };
        self.error = error;
        self.recording = false;
        self.completed_at = Some(self.clamp(now));
        true
    }

    /// Wall-clock time can step backwards; keep the timestamps ordered.
    fn clamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.started_at.unwrap_or(self.created_at);
        now.max(floor)
    }

    /// Milliseconds between start and completion, when both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        u64::try_from((completed - started).num_milliseconds()).ok()
    }
}
