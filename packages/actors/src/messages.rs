//! Message types for the queue actor.

use attendant_core::{
    Capacity, ExecutionMode, Job, JobEvent, JobId, JobRequest, QueueSnapshot, SchedulerError,
    SessionState, WorkerError,
};
use ractor::RpcReplyPort;
use tokio::sync::broadcast;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Validate and queue a new job.
    Submit {
        request: JobRequest,
        reply: RpcReplyPort<Result<Job, SchedulerError>>,
    },

    /// Look up a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Full job history in submission order.
    ListJobs { reply: RpcReplyPort<Vec<Job>> },

    /// Active jobs and the number still waiting.
    Snapshot { reply: RpcReplyPort<QueueSnapshot> },

    /// Worker pool usage.
    GetCapacity { reply: RpcReplyPort<Capacity> },

    /// Driver reports a successful join.
    MarkActive { job_id: JobId, recording: bool },

    /// Driver reports a freshly established session worth persisting.
    SessionEstablished { state: SessionState },

    /// End a job, release its slot and dispatch again.
    Complete {
        job_id: JobId,
        error: Option<String>,
    },

    /// The driver task for a job returned or panicked.
    DriverExited {
        job_id: JobId,
        error: Option<String>,
    },

    /// Leave the meeting and complete the job.
    Leave {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, SchedulerError>>,
    },

    /// A leave started by `Leave` has finished.
    LeaveFinished {
        job_id: JobId,
        error: Option<String>,
        reply: RpcReplyPort<Result<Job, SchedulerError>>,
    },

    /// Stop recording without ending the job.
    StopRecording {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, SchedulerError>>,
    },

    /// A stop started by `StopRecording` has finished.
    RecordingStopFinished {
        job_id: JobId,
        result: Result<(), WorkerError>,
        reply: RpcReplyPort<Result<Job, SchedulerError>>,
    },

    /// A deferred timer for a scheduled job elapsed.
    TimerFired { job_id: JobId },

    /// Rebuild the substrate in a different mode, failing every bound job.
    Reinitialize {
        mode: ExecutionMode,
        reply: RpcReplyPort<Result<Vec<JobId>, SchedulerError>>,
    },

    /// Receive lifecycle events.
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<JobEvent>>,
    },

    /// Cancel timers, close the pool and stop.
    Shutdown { reply: RpcReplyPort<()> },
}
