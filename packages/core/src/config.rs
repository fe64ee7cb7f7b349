//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::worker::ExecutionMode;

/// Configuration for the job queue and its worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently live workers.
    pub max_concurrent: usize,
    /// Execution mode of the shared substrate at startup.
    pub mode: ExecutionMode,
    /// Upper bound on creating one worker (seconds).
    pub worker_setup_timeout_secs: u64,
    /// Upper bound on disposing one worker or the substrate (seconds).
    pub dispose_timeout_secs: u64,
    /// How far in the past a scheduled time may be and still be accepted (seconds).
    pub schedule_grace_secs: u64,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            mode: ExecutionMode::Headless,
            worker_setup_timeout_secs: 30,
            dispose_timeout_secs: 10,
            schedule_grace_secs: 60,
            event_buffer: 1024,
        }
    }
}

impl SchedulerConfig {
    /// Set the worker limit.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the startup execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn worker_setup_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_setup_timeout_secs)
    }

    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_secs(self.dispose_timeout_secs)
    }

    pub fn schedule_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.schedule_grace_secs).unwrap_or(i64::MAX))
    }

    /// Build a config from environment variables, falling back to defaults.
    ///
    /// - `MAX_CONCURRENT_WORKERS` (default: 3, must be at least 1)
    /// - `WORKER_MODE` (`headless`|`headed`, default: headless)
    /// - `WORKER_SETUP_TIMEOUT_SECS` (default: 30)
    /// - `WORKER_DISPOSE_TIMEOUT_SECS` (default: 10)
    /// - `SCHEDULE_GRACE_SECS` (default: 60)
    /// - `EVENT_BUFFER` (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SchedulerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).and_then(non_empty);

        let mode = match var("WORKER_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.mode,
        };

        let config = Self {
            max_concurrent: parse_or(
                "MAX_CONCURRENT_WORKERS",
                var("MAX_CONCURRENT_WORKERS"),
                defaults.max_concurrent,
            )?,
            mode,
            worker_setup_timeout_secs: parse_or(
                "WORKER_SETUP_TIMEOUT_SECS",
                var("WORKER_SETUP_TIMEOUT_SECS"),
                defaults.worker_setup_timeout_secs,
            )?,
            dispose_timeout_secs: parse_or(
                "WORKER_DISPOSE_TIMEOUT_SECS",
                var("WORKER_DISPOSE_TIMEOUT_SECS"),
                defaults.dispose_timeout_secs,
            )?,
            schedule_grace_secs: parse_or(
                "SCHEDULE_GRACE_SECS",
                var("SCHEDULE_GRACE_SECS"),
                defaults.schedule_grace_secs,
            )?,
            event_buffer: parse_or("EVENT_BUFFER", var("EVENT_BUFFER"), defaults.event_buffer)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent",
                value: "0".into(),
                reason: "at least one worker is required".into(),
            });
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "event_buffer",
                value: "0".into(),
                reason: "broadcast channel needs capacity".into(),
            });
        }
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
