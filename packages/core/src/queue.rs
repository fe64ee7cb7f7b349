//! Read-only views of the queue and worker pool.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};

/// Snapshot of worker pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    /// Number of slots currently bound to a job.
    pub active: usize,
    /// Configured slot limit.
    pub max: usize,
}

impl Capacity {
    pub fn is_full(&self) -> bool {
        self.active >= self.max
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Tally a job history.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Total finished jobs.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// What `snapshot()` reports: jobs holding a worker plus the waiting count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Jobs in `Processing` or `Active`, in submission order.
    pub active: Vec<Job>,
    /// Number of jobs still `Queued`.
    pub queued: usize,
    pub capacity: Capacity,
    pub stats: QueueStats,
}
