//! Starting the queue actor and talking to it.

use attendant_core::{
    Capacity, ExecutionMode, Job, JobEvent, JobId, JobRequest, QueueSnapshot, SchedulerError,
};
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::messages::QueueMessage;
use crate::queue_actor::{QueueActor, QueueArgs};

/// Start the job queue with its worker pool.
///
/// Fails if the configuration is invalid or the substrate cannot be launched.
pub async fn start_scheduler(
    args: QueueArgs,
) -> Result<(JobQueueHandle, tokio::task::JoinHandle<()>), SchedulerError> {
    let (actor, handle) = Actor::spawn(None, QueueActor, args)
        .await
        .map_err(|e| SchedulerError::Startup(e.to_string()))?;

    Ok((JobQueueHandle { actor }, handle))
}

/// Cloneable client for the queue actor.
#[derive(Clone)]
pub struct JobQueueHandle {
    actor: ActorRef<QueueMessage>,
}

impl JobQueueHandle {
    /// Queue a job. Returns as soon as it is recorded; execution is not awaited.
    pub async fn submit(&self, request: JobRequest) -> Result<Job, SchedulerError> {
        self.call(|reply| QueueMessage::Submit { request, reply }).await?
    }

    pub async fn status(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        self.call(|reply| QueueMessage::GetJob { job_id, reply })
            .await?
            .ok_or(SchedulerError::NotFound(job_id))
    }

    /// Every job ever submitted, in submission order.
    pub async fn jobs(&self) -> Result<Vec<Job>, SchedulerError> {
        self.call(|reply| QueueMessage::ListJobs { reply }).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, SchedulerError> {
        self.call(|reply| QueueMessage::Snapshot { reply }).await
    }

    pub async fn capacity(&self) -> Result<Capacity, SchedulerError> {
        self.call(|reply| QueueMessage::GetCapacity { reply }).await
    }

    /// Report a successful join for a job driven outside the queue's own driver.
    pub fn mark_active(&self, job_id: JobId, recording: bool) -> Result<(), SchedulerError> {
        self.cast(QueueMessage::MarkActive { job_id, recording })
    }

    /// End a job, release its worker and let the next job in.
    pub fn complete(&self, job_id: JobId, error: Option<String>) -> Result<(), SchedulerError> {
        self.cast(QueueMessage::Complete { job_id, error })
    }

    /// Leave the meeting; resolves once the job has completed.
    pub async fn leave(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        self.call(|reply| QueueMessage::Leave { job_id, reply }).await?
    }

    pub async fn stop_recording(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        self.call(|reply| QueueMessage::StopRecording { job_id, reply }).await?
    }

    /// Rebuild the substrate in `mode`. Returns the jobs that were failed by the teardown.
    pub async fn reinitialize(&self, mode: ExecutionMode) -> Result<Vec<JobId>, SchedulerError> {
        self.call(|reply| QueueMessage::Reinitialize { mode, reply }).await?
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<JobEvent>, SchedulerError> {
        self.call(|reply| QueueMessage::Subscribe { reply }).await
    }

    /// Cancel pending timers, then dispose every worker and the substrate.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.call(|reply| QueueMessage::Shutdown { reply }).await
    }

    fn cast(&self, message: QueueMessage) -> Result<(), SchedulerError> {
        self.actor
            .send_message(message)
            .map_err(|_| SchedulerError::Stopped)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> QueueMessage,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.cast(build(tx.into()))?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }
}
