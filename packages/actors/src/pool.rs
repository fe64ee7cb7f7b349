//! Bounded pool of workers on one shared substrate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use attendant_core::{
    Capacity, ExecutionMode, JobId, SchedulerConfig, SessionState, SessionStore, Substrate, Worker,
    WorkerError, WorkerFactory,
};
use futures_util::future::join_all;
use tokio::task::JoinHandle;

/// Errors raised while acquiring or rebuilding workers.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool is closed")]
    Closed,

    #[error("No substrate is running")]
    NoSubstrate,

    #[error("Failed to create worker: {0}")]
    Create(WorkerError),

    #[error("Failed to launch substrate: {0}")]
    Launch(WorkerError),
}

impl PoolError {
    /// Whether the failure belongs to the job that asked for a worker rather than the pool.
    pub fn is_job_scoped(&self) -> bool {
        matches!(self, PoolError::Create(_))
    }
}

/// Owns the substrate and maps job IDs to their exclusive workers.
///
/// Every mutating method takes `&mut self`, so a capacity check and the bind
/// that follows it cannot interleave with another acquisition.
pub struct ResourcePool {
    factory: Arc<dyn WorkerFactory>,
    sessions: Arc<dyn SessionStore>,
    substrate: Option<Arc<dyn Substrate>>,
    mode: ExecutionMode,
    workers: HashMap<JobId, Arc<dyn Worker>>,
    session: Option<SessionState>,
    max_concurrent: usize,
    setup_timeout: Duration,
    dispose_timeout: Duration,
    /// Latest background session save; each save waits for the one before.
    pending_save: Option<JoinHandle<()>>,
    closed: bool,
}

impl ResourcePool {
    /// Load the persisted session and start the substrate.
    pub async fn launch(
        config: &SchedulerConfig,
        factory: Arc<dyn WorkerFactory>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, PoolError> {
        let session = match sessions.load().await {
            Ok(Some(state)) if state.is_valid() => Some(state),
            Ok(Some(_)) => {
                tracing::warn!("Ignoring invalid persisted session state");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to load persisted session: {}", e);
                None
            }
        };

        let substrate = factory.launch(config.mode).await.map_err(PoolError::Launch)?;
        tracing::info!(
            "Worker pool ready: mode={}, max_concurrent={}, session={}",
            config.mode,
            config.max_concurrent,
            session.is_some()
        );

        Ok(Self {
            factory,
            sessions,
            substrate: Some(substrate),
            mode: config.mode,
            workers: HashMap::new(),
            session,
            max_concurrent: config.max_concurrent,
            setup_timeout: config.worker_setup_timeout(),
            dispose_timeout: config.dispose_timeout(),
            pending_save: None,
            closed: false,
        })
    }

    /// Get the worker bound to `job_id`, creating one if a slot is free.
    ///
    /// `Ok(None)` means the pool is at capacity; nothing changed.
    pub async fn acquire(&mut self, job_id: JobId) -> Result<Option<Arc<dyn Worker>>, PoolError> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        if let Some(worker) = self.workers.get(&job_id) {
            return Ok(Some(worker.clone()));
        }
        if self.workers.len() >= self.max_concurrent {
            return Ok(None);
        }

        let substrate = self.substrate.clone().ok_or(PoolError::NoSubstrate)?;
        let created = tokio::time::timeout(
            self.setup_timeout,
            self.factory.create(&substrate, self.session.as_ref()),
        )
        .await;

        let worker = match created {
            Ok(Ok(worker)) => worker,
            Ok(Err(e)) => return Err(PoolError::Create(e)),
            Err(_) => return Err(PoolError::Create(WorkerError::Timeout(self.setup_timeout))),
        };

        self.workers.insert(job_id, worker.clone());
        tracing::debug!(
            "Worker bound to job {} ({}/{})",
            job_id,
            self.workers.len(),
            self.max_concurrent
        );
        Ok(Some(worker))
    }

    /// Dispose and unbind the worker for `job_id`. Returns false if none was bound.
    pub async fn release(&mut self, job_id: JobId) -> bool {
        let Some(worker) = self.workers.remove(&job_id) else {
            return false;
        };
        dispose_worker(job_id, worker, self.dispose_timeout).await;
        tracing::debug!(
            "Worker released from job {} ({}/{})",
            job_id,
            self.workers.len(),
            self.max_concurrent
        );
        true
    }

    pub fn capacity(&self) -> Capacity {
        Capacity {
            active: self.workers.len(),
            max: self.max_concurrent,
        }
    }

    /// The worker bound to `job_id`, without creating one.
    pub fn worker(&self, job_id: JobId) -> Option<Arc<dyn Worker>> {
        self.workers.get(&job_id).cloned()
    }

    /// Job IDs that currently hold a slot.
    pub fn bound_jobs(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = self.workers.keys().copied().collect();
        jobs.sort();
        jobs
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The session new workers are seeded with.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Remember a freshly established session and persist it in the background.
    ///
    /// Saves run one after another in call order, so the stored blob always
    /// ends up as the latest state.
    pub fn persist_session(&mut self, state: SessionState) {
        if !state.is_valid() {
            tracing::debug!("Skipping invalid session state");
            return;
        }
        self.session = Some(state.clone());

        let sessions = self.sessions.clone();
        let previous = self.pending_save.take();
        self.pending_save = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if let Err(e) = sessions.save(&state).await {
                tracing::warn!("Failed to persist session state: {}", e);
            }
        }));
    }

    /// Wait for background session saves to finish.
    pub async fn flush_session(&mut self) {
        if let Some(save) = self.pending_save.take()
            && let Err(e) = save.await
        {
            tracing::warn!("Session save task failed: {}", e);
        }
    }

    /// Tear down every worker and the substrate, then relaunch in `mode`.
    ///
    /// Returns the jobs whose workers were disposed. Their status is the
    /// caller's concern.
    pub async fn reinitialize(&mut self, mode: ExecutionMode) -> Result<Vec<JobId>, PoolError> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        tracing::info!("Reinitializing worker pool: {} -> {}", self.mode, mode);

        let orphaned = self.teardown().await;
        let substrate = self.factory.launch(mode).await.map_err(PoolError::Launch)?;
        self.substrate = Some(substrate);
        self.mode = mode;

        Ok(orphaned)
    }

    /// Dispose every worker, then the substrate. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.flush_session().await;
        let disposed = self.teardown().await;
        tracing::info!("Worker pool closed ({} worker(s) disposed)", disposed.len());
    }

    async fn teardown(&mut self) -> Vec<JobId> {
        let orphaned = self.bound_jobs();
        let timeout = self.dispose_timeout;
        join_all(
            self.workers
                .drain()
                .map(|(job_id, worker)| dispose_worker(job_id, worker, timeout)),
        )
        .await;

        if let Some(substrate) = self.substrate.take() {
            match tokio::time::timeout(timeout, substrate.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Substrate shutdown failed: {}", e),
                Err(_) => tracing::warn!("Substrate shutdown timed out after {:?}", timeout),
            }
        }
        orphaned
    }
}

async fn dispose_worker(job_id: JobId, worker: Arc<dyn Worker>, timeout: Duration) {
    match tokio::time::timeout(timeout, worker.dispose()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to dispose worker for job {}: {}", job_id, e),
        Err(_) => tracing::warn!("Disposing worker for job {} timed out", job_id),
    }
}
