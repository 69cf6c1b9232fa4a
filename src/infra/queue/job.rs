//! Capacity-one, latest-wins job queue feeding the single-shot inference worker.

use std::sync::Arc;

use crate::core::{Job, VerifierError};
use crate::infra::queue::BoundedRing;

/// Job queue between slot workers and the single-shot inference worker.
///
/// Holds at most one pending job. Submitting while a job is pending evicts
/// the stale one; its waiter observes a closed reply channel.
#[derive(Debug, Clone)]
pub struct JobQueue {
    ring: Arc<BoundedRing<Job>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            ring: Arc::new(BoundedRing::new(1)),
        }
    }

    /// Submit a job, replacing any job still pending.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::QueueClosed` after shutdown.
    pub fn submit(&self, job: Job) -> Result<(), VerifierError> {
        let (job_id, slot_id) = (job.id, job.slot_id);
        if let Some(stale) = self.ring.push(job)? {
            tracing::warn!(
                slot_id = stale.slot_id,
                job_id = %stale.id,
                replaced_by = slot_id,
                "stale job evicted from inference queue"
            );
        }
        tracing::debug!(slot_id, job_id = %job_id, "job submitted");
        Ok(())
    }

    /// Wait for the next job. `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<Job> {
        self.ring.pop().await
    }

    /// Take the pending job, if any.
    pub fn try_next(&self) -> Option<Job> {
        self.ring.try_pop()
    }

    /// Close the queue; pending waiters wake and pending jobs are dropped.
    pub fn close(&self) {
        self.ring.close();
        drop(self.ring.drain());
    }

    /// Whether a job is waiting.
    pub fn has_pending(&self) -> bool {
        !self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_job_wins() {
        let queue = JobQueue::new();
        let (first, mut first_rx) = Job::new(0, "/tmp/slot_0.jpg");
        let (second, _second_rx) = Job::new(1, "/tmp/slot_1.jpg");

        queue.submit(first).unwrap();
        queue.submit(second).unwrap();

        // The evicted job was dropped, so its waiter sees a closed channel.
        assert!(first_rx.try_recv().is_err());
        let pending = queue.try_next().unwrap();
        assert_eq!(pending.slot_id, 1);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_close_rejects_and_drops_pending() {
        let queue = JobQueue::new();
        let (job, mut rx) = Job::new(0, "/tmp/slot_0.jpg");
        queue.submit(job).unwrap();
        queue.close();
        assert!(rx.try_recv().is_err());

        let (late, _rx) = Job::new(1, "/tmp/slot_1.jpg");
        assert!(matches!(queue.submit(late), Err(VerifierError::QueueClosed(_))));
    }
}
