//! Contracts for the collaborators the scheduler drives but does not implement.
//!
//! A [`WorkerFactory`] launches one shared [`Substrate`] (an automation engine
//! process) and creates isolated [`Worker`]s on top of it. A [`SessionStore`]
//! keeps the most recent authenticated [`SessionState`] so new workers can
//! start signed in.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError, WorkerError};

/// Boxed future returned by collaborator methods.
pub type WorkerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether the automation engine runs with a visible window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Headless,
    Headed,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Headless => "headless",
            ExecutionMode::Headed => "headed",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" | "invisible" => Ok(ExecutionMode::Headless),
            "headed" | "visible" => Ok(ExecutionMode::Headed),
            other => Err(ConfigError::Invalid {
                key: "mode",
                value: other.to_string(),
                reason: "expected headless|headed".into(),
            }),
        }
    }
}

/// Serialized state that resumes an authenticated session.
///
/// Opaque to the scheduler apart from [`SessionState::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(pub serde_json::Value);

impl SessionState {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Only a non-empty JSON object can seed a worker.
    pub fn is_valid(&self) -> bool {
        self.0.as_object().is_some_and(|map| !map.is_empty())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// An exclusive automation context bound to one job.
pub trait Worker: Send + Sync {
    /// Join the meeting at `target`.
    fn join<'a>(&'a self, target: &'a str) -> WorkerFuture<'a, Result<(), WorkerError>>;

    fn start_recording(&self) -> WorkerFuture<'_, Result<(), WorkerError>>;

    fn stop_recording(&self) -> WorkerFuture<'_, Result<(), WorkerError>>;

    fn leave(&self) -> WorkerFuture<'_, Result<(), WorkerError>>;

    fn is_recording(&self) -> bool;

    /// Export session state established by a successful join, if any.
    fn export_session(&self) -> WorkerFuture<'_, Result<Option<SessionState>, WorkerError>>;

    /// Tear down the isolated context. Errors are logged by the pool, never propagated.
    fn dispose(&self) -> WorkerFuture<'_, Result<(), WorkerError>>;
}

/// The shared heavyweight engine underneath all live workers.
pub trait Substrate: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    fn shutdown(&self) -> WorkerFuture<'_, Result<(), WorkerError>>;
}

/// Produces substrates and the workers that run on them.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Start a new substrate in the given mode.
    fn launch(&self, mode: ExecutionMode) -> WorkerFuture<'_, Result<Arc<dyn Substrate>, WorkerError>>;

    /// Create a worker on `substrate`, seeded with `session` when present.
    fn create<'a>(
        &'a self,
        substrate: &'a Arc<dyn Substrate>,
        session: Option<&'a SessionState>,
    ) -> WorkerFuture<'a, Result<Arc<dyn Worker>, WorkerError>>;
}

/// Persistence for the single per-deployment session blob.
pub trait SessionStore: Send + Sync + 'static {
    fn load(&self) -> WorkerFuture<'_, Result<Option<SessionState>, StoreError>>;

    fn save<'a>(&'a self, state: &'a SessionState) -> WorkerFuture<'a, Result<(), StoreError>>;
}
