//! Queue actor: job history, dispatch and the worker pool.
//!
//! The actor's mailbox is the single point of mutation for job status, the
//! pool bindings and the timer registry. Drivers run as separate tasks and
//! only report back through messages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use attendant_core::{
    Job, JobEvent, JobId, JobStatus, QueueSnapshot, QueueStats, SchedulerConfig, SchedulerError,
    SessionStore, Worker, WorkerFactory,
};
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::driver::{JobDriver, MeetingDriver, spawn_driver};
use crate::messages::QueueMessage;
use crate::pool::ResourcePool;
use crate::timers::DeferredTimers;

const REINITIALIZED: &str = "worker pool reinitialized";
const EXITED_EARLY: &str = "job driver exited before the job became active";

/// Arguments for spawning the queue actor.
pub struct QueueArgs {
    pub config: SchedulerConfig,
    pub factory: Arc<dyn WorkerFactory>,
    pub sessions: Arc<dyn SessionStore>,
    pub driver: Arc<dyn JobDriver>,
}

impl QueueArgs {
    /// Arguments using the default [`MeetingDriver`].
    pub fn new(
        config: SchedulerConfig,
        factory: Arc<dyn WorkerFactory>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            factory,
            sessions,
            driver: Arc::new(MeetingDriver),
        }
    }

    /// Replace the job driver.
    pub fn with_driver(mut self, driver: Arc<dyn JobDriver>) -> Self {
        self.driver = driver;
        self
    }
}

/// State for the queue actor.
pub struct QueueActorState {
    /// Every submitted job, in submission order. Never shrinks.
    jobs: Vec<Job>,
    /// Position of each job in `jobs`.
    index: HashMap<JobId, usize>,
    pool: ResourcePool,
    timers: DeferredTimers,
    driver: Arc<dyn JobDriver>,
    /// Jobs with a leave in flight.
    leaving: HashSet<JobId>,
    event_tx: broadcast::Sender<JobEvent>,
    schedule_grace: chrono::Duration,
    shutting_down: bool,
}

impl QueueActorState {
    fn new(config: &SchedulerConfig, pool: ResourcePool, driver: Arc<dyn JobDriver>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_buffer);
        Self {
            jobs: Vec::new(),
            index: HashMap::new(),
            pool,
            timers: DeferredTimers::default(),
            driver,
            leaving: HashSet::new(),
            event_tx,
            schedule_grace: config.schedule_grace(),
            shutting_down: false,
        }
    }

    fn job(&self, job_id: JobId) -> Option<&Job> {
        self.index.get(&job_id).and_then(|&i| self.jobs.get(i))
    }

    fn job_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        let i = *self.index.get(&job_id)?;
        self.jobs.get_mut(i)
    }

    /// Broadcast an event.
    fn broadcast(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    fn capacity_changed(&self) {
        self.broadcast(JobEvent::CapacityChanged {
            capacity: self.pool.capacity(),
            timestamp: Utc::now(),
        });
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self
                .jobs
                .iter()
                .filter(|job| job.status.holds_slot())
                .cloned()
                .collect(),
            queued: self
                .jobs
                .iter()
                .filter(|job| job.status == JobStatus::Queued)
                .count(),
            capacity: self.pool.capacity(),
            stats: QueueStats::from_jobs(&self.jobs),
        }
    }

    fn append(&mut self, job: Job) {
        self.index.insert(job.id, self.jobs.len());
        self.jobs.push(job);
    }

    /// One dispatch pass: start ready jobs in submission order until the pool
    /// refuses, then arm a timer for the earliest deferred job.
    async fn dispatch(&mut self, myself: &ActorRef<QueueMessage>) {
        if self.shutting_down {
            return;
        }

        let now = Utc::now();
        let ready: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|job| job.is_ready(now))
            .map(|job| job.id)
            .collect();

        for job_id in ready {
            match self.pool.acquire(job_id).await {
                Ok(Some(worker)) => self.start_job(job_id, worker, myself),
                Ok(None) => {
                    tracing::debug!("Pool at capacity; job {} keeps waiting", job_id);
                    break;
                }
                Err(e) if e.is_job_scoped() => {
                    tracing::warn!("Job {} failed before a worker was bound: {}", job_id, e);
                    self.finish_unbound(job_id, e.to_string());
                }
                Err(e) => {
                    tracing::warn!("Dispatch pass stopped: {}", e);
                    break;
                }
            }
        }

        self.arm_next_timer(now, myself);
    }

    fn start_job(&mut self, job_id: JobId, worker: Arc<dyn Worker>, myself: &ActorRef<QueueMessage>) {
        self.timers.cancel(job_id);

        let Some(job) = self.job_mut(job_id) else {
            return;
        };
        if !job.start(Utc::now()) {
            return;
        }
        let job = job.clone();

        tracing::info!("Job {} processing: {}", job.id, job.target);
        self.broadcast(JobEvent::JobStarted {
            job_id,
            timestamp: job.started_at.unwrap_or(job.created_at),
        });
        self.capacity_changed();

        spawn_driver(self.driver.clone(), job, worker, myself.clone());
    }

    /// Arm a timer for the earliest job not ready at `now`, unless it has one.
    fn arm_next_timer(&mut self, now: DateTime<Utc>, myself: &ActorRef<QueueMessage>) {
        let next = self
            .jobs
            .iter()
            .filter_map(|job| job.deferred_until(now).map(|at| (at, job.id)))
            .min_by_key(|(at, _)| *at);

        if let Some((at, job_id)) = next
            && !self.timers.is_pending(job_id)
        {
            let delay = (at - Utc::now()).to_std().unwrap_or_default();
            self.timers.arm(job_id, delay, myself.clone());
        }
    }

    /// `Queued -> Failed` for a job that never obtained a worker.
    fn finish_unbound(&mut self, job_id: JobId, error: String) {
        self.timers.cancel(job_id);
        let Some(job) = self.job_mut(job_id) else {
            return;
        };
        if !job.finish(Utc::now(), Some(error)) {
            return;
        }
        let finished = job.clone();
        self.announce_finished(&finished);
    }

    /// End a job holding a slot and release it. Returns false if nothing changed.
    async fn complete(&mut self, job_id: JobId, error: Option<String>) -> bool {
        let finished = match self.job_mut(job_id) {
            Some(job) if job.status.holds_slot() => {
                job.finish(Utc::now(), error);
                job.clone()
            }
            Some(job) => {
                tracing::debug!("Ignoring completion of job {} in status {}", job_id, job.status);
                return false;
            }
            None => {
                tracing::warn!("Completion for unknown job {}", job_id);
                return false;
            }
        };

        self.leaving.remove(&job_id);
        if self.pool.release(job_id).await {
            self.capacity_changed();
        }
        self.announce_finished(&finished);
        true
    }

    fn announce_finished(&self, job: &Job) {
        let timestamp = job.completed_at.unwrap_or_else(Utc::now);
        match (&job.status, &job.error) {
            (JobStatus::Failed, Some(error)) => {
                tracing::info!("Job {} failed: {}", job.id, error);
                self.broadcast(JobEvent::JobFailed {
                    job_id: job.id,
                    error: error.clone(),
                    timestamp,
                });
            }
            _ => {
                tracing::info!("Job {} completed", job.id);
                self.broadcast(JobEvent::JobCompleted {
                    job_id: job.id,
                    duration_ms: job.duration_ms(),
                    timestamp,
                });
            }
        }
    }
}

/// Queue actor that owns the job history and the worker pool.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job queue (max_concurrent={}, mode={})",
            args.config.max_concurrent,
            args.config.mode
        );
        args.config.validate()?;

        let pool = ResourcePool::launch(&args.config, args.factory, args.sessions).await?;
        Ok(QueueActorState::new(&args.config, pool, args.driver))
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.timers.cancel_all();
        state.pool.close().await;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit { request, reply } => {
                if state.shutting_down {
                    let _ = reply.send(Err(SchedulerError::ShuttingDown));
                    return Ok(());
                }

                let now = Utc::now();
                if let Err(e) = request.validate(now, state.schedule_grace) {
                    let _ = reply.send(Err(e));
                    return Ok(());
                }

                let job = Job::new(request, now);
                tracing::info!("Job {} submitted: {}", job.id, job.target);
                state.append(job.clone());
                state.broadcast(JobEvent::JobSubmitted {
                    job: job.clone(),
                    timestamp: now,
                });

                let _ = reply.send(Ok(job));
                state.dispatch(&myself).await;
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.job(job_id).cloned());
            }

            QueueMessage::ListJobs { reply } => {
                let _ = reply.send(state.jobs.clone());
            }

            QueueMessage::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }

            QueueMessage::GetCapacity { reply } => {
                let _ = reply.send(state.pool.capacity());
            }

            QueueMessage::MarkActive { job_id, recording } => {
                let activated = state
                    .job_mut(job_id)
                    .is_some_and(|job| job.activate(recording));
                if activated {
                    tracing::info!("Job {} active (recording={})", job_id, recording);
                    state.broadcast(JobEvent::JobActive {
                        job_id,
                        recording,
                        timestamp: Utc::now(),
                    });
                } else {
                    tracing::debug!("Ignoring activation of job {}", job_id);
                }
            }

            QueueMessage::SessionEstablished { state: session } => {
                state.pool.persist_session(session);
            }

            QueueMessage::Complete { job_id, error } => {
                if state.complete(job_id, error).await {
                    state.dispatch(&myself).await;
                }
            }

            QueueMessage::DriverExited { job_id, error } => {
                let status = state.job(job_id).map(|job| job.status);
                let error = match (status, error) {
                    (Some(status), Some(error)) if status.holds_slot() => Some(error),
                    (Some(JobStatus::Processing), None) => Some(EXITED_EARLY.to_string()),
                    _ => None,
                };
                if let Some(error) = error
                    && state.complete(job_id, Some(error)).await
                {
                    state.dispatch(&myself).await;
                }
            }

            QueueMessage::Leave { job_id, reply } => {
                let Some(status) = state.job(job_id).map(|job| job.status) else {
                    let _ = reply.send(Err(SchedulerError::NotFound(job_id)));
                    return Ok(());
                };
                if state.leaving.contains(&job_id) {
                    let _ = reply.send(Err(SchedulerError::AlreadyLeaving(job_id)));
                    return Ok(());
                }
                let Some(worker) = state.pool.worker(job_id).filter(|_| status.holds_slot()) else {
                    let _ = reply.send(Err(SchedulerError::WorkerNotBound(job_id)));
                    return Ok(());
                };

                state.leaving.insert(job_id);
                tracing::info!("Job {} leaving", job_id);
                tokio::spawn(async move {
                    if worker.is_recording()
                        && let Err(e) = worker.stop_recording().await
                    {
                        tracing::warn!("Job {}: failed to stop recording before leaving: {}", job_id, e);
                    }
                    let error = worker.leave().await.err().map(|e| e.to_string());
                    if myself
                        .send_message(QueueMessage::LeaveFinished {
                            job_id,
                            error,
                            reply,
                        })
                        .is_err()
                    {
                        tracing::debug!("Queue stopped while job {} was leaving", job_id);
                    }
                });
            }

            QueueMessage::LeaveFinished {
                job_id,
                error,
                reply,
            } => {
                state.leaving.remove(&job_id);
                if state.complete(job_id, error).await {
                    state.dispatch(&myself).await;
                }
                let result = state
                    .job(job_id)
                    .cloned()
                    .ok_or(SchedulerError::NotFound(job_id));
                let _ = reply.send(result);
            }

            QueueMessage::StopRecording { job_id, reply } => {
                let Some(status) = state.job(job_id).map(|job| job.status) else {
                    let _ = reply.send(Err(SchedulerError::NotFound(job_id)));
                    return Ok(());
                };
                if status != JobStatus::Active {
                    let _ = reply.send(Err(SchedulerError::InvalidRequest(format!(
                        "job {} is {}, not active",
                        job_id, status
                    ))));
                    return Ok(());
                }
                let Some(worker) = state.pool.worker(job_id) else {
                    let _ = reply.send(Err(SchedulerError::WorkerNotBound(job_id)));
                    return Ok(());
                };

                tokio::spawn(async move {
                    let result = worker.stop_recording().await;
                    let _ = myself.send_message(QueueMessage::RecordingStopFinished {
                        job_id,
                        result,
                        reply,
                    });
                });
            }

            QueueMessage::RecordingStopFinished {
                job_id,
                result,
                reply,
            } => {
                if let Err(e) = result {
                    tracing::warn!("Job {}: failed to stop recording: {}", job_id, e);
                    let _ = reply.send(Err(SchedulerError::Action(e)));
                    return Ok(());
                }

                let stopped = match state.job_mut(job_id) {
                    Some(job) if job.status == JobStatus::Active && job.recording => {
                        job.recording = false;
                        true
                    }
                    _ => false,
                };
                if stopped {
                    state.broadcast(JobEvent::RecordingStopped {
                        job_id,
                        timestamp: Utc::now(),
                    });
                }
                let result = state
                    .job(job_id)
                    .cloned()
                    .ok_or(SchedulerError::NotFound(job_id));
                let _ = reply.send(result);
            }

            QueueMessage::TimerFired { job_id } => {
                if state.timers.fired(job_id) {
                    tracing::debug!("Deferred timer for job {} fired", job_id);
                }
                state.dispatch(&myself).await;
            }

            QueueMessage::Reinitialize { mode, reply } => {
                if state.shutting_down {
                    let _ = reply.send(Err(SchedulerError::ShuttingDown));
                    return Ok(());
                }

                let orphaned = state.pool.bound_jobs();
                let rebuilt = state.pool.reinitialize(mode).await;

                for &job_id in &orphaned {
                    state.leaving.remove(&job_id);
                    state.finish_unbound(job_id, REINITIALIZED.to_string());
                }
                state.capacity_changed();
                state.broadcast(JobEvent::PoolReinitialized {
                    mode,
                    orphaned: orphaned.clone(),
                    timestamp: Utc::now(),
                });

                match rebuilt {
                    Ok(_) => {
                        let _ = reply.send(Ok(orphaned));
                        state.dispatch(&myself).await;
                    }
                    Err(e) => {
                        tracing::warn!("Worker pool reinitialization failed: {}", e);
                        let _ = reply.send(Err(SchedulerError::Pool(e.to_string())));
                    }
                }
            }

            QueueMessage::Subscribe { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            QueueMessage::Shutdown { reply } => {
                state.shutting_down = true;
                let cancelled = state.timers.cancel_all();
                state.pool.close().await;
                tracing::info!("Job queue shut down ({} pending timer(s) cancelled)", cancelled);

                let _ = reply.send(());
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}
