#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{JobQueueHandle, QueueArgs, start_scheduler};
use attendant_core::{
    ExecutionMode, Job, JobId, JobStatus, SchedulerConfig, SchedulerError, SessionState,
    SessionStore, StoreError, Substrate, Worker, WorkerError, WorkerFactory, WorkerFuture,
};

/// Counters shared by every fake the factory hands out.
#[derive(Default)]
pub struct Probe {
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub disposed: AtomicUsize,
    pub launches: Mutex<Vec<ExecutionMode>>,
    pub shutdowns: AtomicUsize,
    pub seeded: AtomicUsize,
}

impl Probe {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> Vec<ExecutionMode> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub probe: Arc<Probe>,
    pub join_delay: Duration,
    pub fail_creates: AtomicUsize,
    pub fail_dispose: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = delay;
        self
    }

    pub fn with_failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    /// Make the next `count` worker creations fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }
}

impl WorkerFactory for FakeFactory {
    fn launch(&self, mode: ExecutionMode) -> WorkerFuture<'_, Result<Arc<dyn Substrate>, WorkerError>> {
        Box::pin(async move {
            if let Ok(mut launches) = self.probe.launches.lock() {
                launches.push(mode);
            }
            Ok(Arc::new(FakeSubstrate {
                mode,
                probe: self.probe.clone(),
            }) as Arc<dyn Substrate>)
        })
    }

    fn create<'a>(
        &'a self,
        _substrate: &'a Arc<dyn Substrate>,
        session: Option<&'a SessionState>,
    ) -> WorkerFuture<'a, Result<Arc<dyn Worker>, WorkerError>> {
        Box::pin(async move {
            let failing = self
                .fail_creates
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(WorkerError::Setup("context refused".to_string()));
            }
            if session.is_some() {
                self.probe.seeded.fetch_add(1, Ordering::SeqCst);
            }
            self.probe.created.fetch_add(1, Ordering::SeqCst);
            let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_live.fetch_max(live, Ordering::SeqCst);
            Ok(Arc::new(FakeWorker {
                probe: self.probe.clone(),
                join_delay: self.join_delay,
                fail_dispose: self.fail_dispose,
                recording: AtomicBool::new(false),
                target: Mutex::new(String::new()),
            }) as Arc<dyn Worker>)
        })
    }
}

pub struct FakeSubstrate {
    mode: ExecutionMode,
    probe: Arc<Probe>,
}

impl Substrate for FakeSubstrate {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn shutdown(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Join fails for targets containing `fail-join`; recording fails for `no-record`.
pub struct FakeWorker {
    probe: Arc<Probe>,
    join_delay: Duration,
    fail_dispose: bool,
    recording: AtomicBool,
    target: Mutex<String>,
}

impl FakeWorker {
    fn target(&self) -> String {
        self.target.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Worker for FakeWorker {
    fn join<'a>(&'a self, target: &'a str) -> WorkerFuture<'a, Result<(), WorkerError>> {
        Box::pin(async move {
            if let Ok(mut t) = self.target.lock() {
                *t = target.to_string();
            }
            tokio::time::sleep(self.join_delay).await;
            if target.contains("fail-join") {
                return Err(WorkerError::Join("meeting not found".to_string()));
            }
            Ok(())
        })
    }

    fn start_recording(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            if self.target().contains("no-record") {
                return Err(WorkerError::Recording("no capture device".to_string()));
            }
            self.recording.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn stop_recording(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            self.recording.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn leave(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move { Ok(()) })
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn export_session(&self) -> WorkerFuture<'_, Result<Option<SessionState>, WorkerError>> {
        Box::pin(async move {
            Ok(Some(SessionState::new(serde_json::json!({
                "cookies": [{ "name": "sid", "value": self.target() }]
            }))))
        })
    }

    fn dispose(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            self.probe.live.fetch_sub(1, Ordering::SeqCst);
            self.probe.disposed.fetch_add(1, Ordering::SeqCst);
            if self.fail_dispose {
                return Err(WorkerError::Substrate("context already closed".to_string()));
            }
            Ok(())
        })
    }
}

/// In-memory session store that records saves.
#[derive(Default)]
pub struct MemorySessions {
    pub state: Mutex<Option<SessionState>>,
    pub saves: AtomicUsize,
}

impl MemorySessions {
    pub fn seeded(state: SessionState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SessionStore for MemorySessions {
    fn load(&self) -> WorkerFuture<'_, Result<Option<SessionState>, StoreError>> {
        Box::pin(async move {
            self.state
                .lock()
                .map(|s| s.clone())
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
    }

    fn save<'a>(&'a self, state: &'a SessionState) -> WorkerFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut slot = self
                .state
                .lock()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            *slot = Some(state.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

pub fn config(max_concurrent: usize) -> SchedulerConfig {
    SchedulerConfig::default().with_max_concurrent(max_concurrent)
}

/// Start a queue on `factory`, returning the handle and the shared session store.
pub async fn start_with(
    max_concurrent: usize,
    factory: Arc<FakeFactory>,
) -> Result<(JobQueueHandle, Arc<MemorySessions>), SchedulerError> {
    let sessions = Arc::new(MemorySessions::default());
    let args = QueueArgs::new(config(max_concurrent), factory, sessions.clone());
    let (queue, _handle) = start_scheduler(args).await?;
    Ok((queue, sessions))
}

pub async fn start(
    max_concurrent: usize,
) -> Result<(JobQueueHandle, Arc<FakeFactory>), SchedulerError> {
    let factory = Arc::new(FakeFactory::new());
    let (queue, _) = start_with(max_concurrent, factory.clone()).await?;
    Ok((queue, factory))
}

/// Poll until the store has seen `count` saves, or fail after two seconds.
pub async fn wait_for_saves(sessions: &MemorySessions, count: usize) -> Result<(), SchedulerError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while sessions.saves() < count {
        if tokio::time::Instant::now() >= deadline {
            return Err(SchedulerError::InvalidRequest(format!(
                "saw {} session save(s), expected {}",
                sessions.saves(),
                count
            )));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Poll until the job reaches `status`, or fail after two seconds.
pub async fn wait_for_status(
    queue: &JobQueueHandle,
    job_id: JobId,
    status: JobStatus,
) -> Result<Job, SchedulerError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let job = queue.status(job_id).await?;
        if job.status == status {
            return Ok(job);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SchedulerError::InvalidRequest(format!(
                "job {} stuck in {} waiting for {}",
                job_id, job.status, status
            )));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
