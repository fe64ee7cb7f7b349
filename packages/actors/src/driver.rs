//! Job drivers: the routine that runs a job on its acquired worker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use attendant_core::{Job, JobId, SessionState, Worker, WorkerError};
use ractor::ActorRef;

use crate::messages::QueueMessage;

/// Future type for async job drivers.
pub type DriverFuture = Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send>>;

/// Trait for job drivers.
///
/// A driver gets a job and its exclusive worker, performs the join and calls
/// [`DriverHandle::mark_active`]. Returning `Err` fails the job and frees its
/// slot. Returning `Ok` before marking the job active is treated as a failure.
pub trait JobDriver: Send + Sync + 'static {
    fn drive(&self, job: Job, worker: Arc<dyn Worker>, handle: DriverHandle) -> DriverFuture;
}

/// The driver's channel back to the queue.
#[derive(Clone)]
pub struct DriverHandle {
    job_id: JobId,
    queue: ActorRef<QueueMessage>,
}

impl DriverHandle {
    pub(crate) fn new(job_id: JobId, queue: ActorRef<QueueMessage>) -> Self {
        Self { job_id, queue }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report that the worker joined. Ignored if the job already left `Processing`.
    pub fn mark_active(&self, recording: bool) {
        self.send(QueueMessage::MarkActive {
            job_id: self.job_id,
            recording,
        });
    }

    /// Hand over session state established by the join.
    pub fn session_established(&self, state: SessionState) {
        self.send(QueueMessage::SessionEstablished { state });
    }

    /// End the job from within the driver, e.g. when the meeting ends on its own.
    pub fn complete(&self, error: Option<String>) {
        self.send(QueueMessage::Complete {
            job_id: self.job_id,
            error,
        });
    }

    fn send(&self, message: QueueMessage) {
        if self.queue.send_message(message).is_err() {
            tracing::debug!("Queue stopped; dropping driver message for job {}", self.job_id);
        }
    }
}

/// Default driver: join, optionally record, persist the session, go active.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeetingDriver;

impl JobDriver for MeetingDriver {
    fn drive(&self, job: Job, worker: Arc<dyn Worker>, handle: DriverHandle) -> DriverFuture {
        Box::pin(async move {
            tracing::info!("Joining {} for job {}", job.target, job.id);
            worker.join(&job.target).await?;

            match worker.export_session().await {
                Ok(Some(state)) => handle.session_established(state),
                Ok(None) => {}
                Err(e) => tracing::warn!("Job {}: could not export session: {}", job.id, e),
            }

            if job.wants_recording
                && let Err(e) = worker.start_recording().await
            {
                tracing::warn!("Job {}: recording did not start: {}", job.id, e);
            }

            handle.mark_active(worker.is_recording());
            Ok(())
        })
    }
}

/// Run `driver` as its own task and report how it ended.
///
/// The outer task observes errors and panics alike, so the queue always
/// learns when a driver is gone.
pub(crate) fn spawn_driver(
    driver: Arc<dyn JobDriver>,
    job: Job,
    worker: Arc<dyn Worker>,
    queue: ActorRef<QueueMessage>,
) {
    let job_id = job.id;
    let handle = DriverHandle::new(job_id, queue.clone());
    let task = tokio::spawn(driver.drive(job, worker, handle));

    tokio::spawn(async move {
        let error = match task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("job driver panicked".to_string()),
            Err(e) => Some(format!("job driver aborted: {}", e)),
        };
        if queue
            .send_message(QueueMessage::DriverExited { job_id, error })
            .is_err()
        {
            tracing::debug!("Queue stopped before driver for job {} exited", job_id);
        }
    });
}
