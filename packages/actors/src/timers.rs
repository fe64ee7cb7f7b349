//! Registry of deferred-dispatch timers, at most one per job.

use std::collections::HashMap;
use std::time::Duration;

use attendant_core::JobId;
use ractor::ActorRef;
use tokio::task::JoinHandle;

use crate::messages::QueueMessage;

#[derive(Default)]
pub(crate) struct DeferredTimers {
    pending: HashMap<JobId, JoinHandle<()>>,
}

impl DeferredTimers {
    pub(crate) fn is_pending(&self, job_id: JobId) -> bool {
        self.pending.contains_key(&job_id)
    }

    /// Post `TimerFired` for `job_id` after `delay`. No-op if one is already pending.
    pub(crate) fn arm(&mut self, job_id: JobId, delay: Duration, queue: ActorRef<QueueMessage>) {
        if self.is_pending(job_id) {
            return;
        }
        tracing::debug!("Deferring job {} for {:?}", job_id, delay);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = queue.send_message(QueueMessage::TimerFired { job_id });
        });
        self.pending.insert(job_id, handle);
    }

    /// Drop the registry entry of a timer that has fired.
    pub(crate) fn fired(&mut self, job_id: JobId) -> bool {
        self.pending.remove(&job_id).is_some()
    }

    pub(crate) fn cancel(&mut self, job_id: JobId) {
        if let Some(handle) = self.pending.remove(&job_id) {
            handle.abort();
        }
    }

    /// Abort every pending timer; returns how many were cancelled.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
        count
    }
}
