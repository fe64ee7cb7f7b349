//! In-process simulated browser: lets the scheduler run end to end without
//! a real automation engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use attendant_core::{
    ExecutionMode, SessionState, Substrate, Worker, WorkerError, WorkerFactory, WorkerFuture,
};

pub struct SimFactory {
    join_delay: Duration,
    next_id: AtomicU64,
}

impl SimFactory {
    pub fn new(join_delay: Duration) -> Self {
        Self {
            join_delay,
            next_id: AtomicU64::new(1),
        }
    }
}

impl WorkerFactory for SimFactory {
    fn launch(&self, mode: ExecutionMode) -> WorkerFuture<'_, Result<Arc<dyn Substrate>, WorkerError>> {
        Box::pin(async move {
            tracing::info!("Launching simulated browser ({})", mode);
            Ok(Arc::new(SimBrowser { mode }) as Arc<dyn Substrate>)
        })
    }

    fn create<'a>(
        &'a self,
        substrate: &'a Arc<dyn Substrate>,
        session: Option<&'a SessionState>,
    ) -> WorkerFuture<'a, Result<Arc<dyn Worker>, WorkerError>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Opening context {} on {} browser (session: {})",
                id,
                substrate.mode(),
                session.is_some()
            );
            Ok(Arc::new(SimContext {
                id,
                join_delay: self.join_delay,
                recording: AtomicBool::new(false),
                joined: AtomicBool::new(false),
            }) as Arc<dyn Worker>)
        })
    }
}

struct SimBrowser {
    mode: ExecutionMode,
}

impl Substrate for SimBrowser {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn shutdown(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            tracing::info!("Simulated browser closed");
            Ok(())
        })
    }
}

struct SimContext {
    id: u64,
    join_delay: Duration,
    recording: AtomicBool,
    joined: AtomicBool,
}

impl Worker for SimContext {
    fn join<'a>(&'a self, target: &'a str) -> WorkerFuture<'a, Result<(), WorkerError>> {
        Box::pin(async move {
            if !target.contains("://") {
                return Err(WorkerError::Join(format!("not a meeting link: {target}")));
            }
            tokio::time::sleep(self.join_delay).await;
            self.joined.store(true, Ordering::SeqCst);
            tracing::info!("Context {} joined {}", self.id, target);
            Ok(())
        })
    }

    fn start_recording(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
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
        Box::pin(async move {
            self.joined.store(false, Ordering::SeqCst);
            tracing::info!("Context {} left", self.id);
            Ok(())
        })
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn export_session(&self) -> WorkerFuture<'_, Result<Option<SessionState>, WorkerError>> {
        Box::pin(async move {
            if !self.joined.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(SessionState::new(serde_json::json!({
                "cookies": [{ "name": "sim-session", "value": format!("ctx-{}", self.id) }]
            }))))
        })
    }

    fn dispose(&self) -> WorkerFuture<'_, Result<(), WorkerError>> {
        Box::pin(async move {
            tracing::debug!("Context {} disposed", self.id);
            Ok(())
        })
    }
}
