//! Per-slot verification run.
//!
//! A worker is spawned on every vacant-to-occupied edge and runs once:
//! take the camera, aim it at the slot's preset, let it settle, run the
//! configured detection strategy, post exactly one verdict and release the
//! camera. Cancellation at any await point ends the run without a verdict.
//! The reposition call itself runs to completion under the lease; the token
//! is checked once it returns.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{
    CameraControl, CameraLock, DetectionMatcher, FrameSource, Job, LockError, Verdict,
};
use crate::infra::mailbox::VerdictSender;
use crate::infra::queue::{DetectionFeed, FeedReader, JobQueue};
use crate::util::{now_ms, PresetId, SlotId};

/// How a worker obtains a detection result once the camera is aimed.
#[derive(Clone)]
pub enum DetectionStrategy {
    /// Capture one frame and hand it to the single-shot inference worker.
    SingleShot {
        /// Frame grabber.
        frames: Arc<dyn FrameSource>,
        /// Queue shared with the inference worker.
        jobs: JobQueue,
        /// Upper bound on the wait for the job's verdict.
        verdict_timeout: Duration,
    },
    /// Poll the streaming inference worker's feed.
    Polling {
        /// Feed published by the streaming worker.
        feed: DetectionFeed,
        /// Reads before giving up.
        max_attempts: u32,
        /// Delay between reads.
        interval: Duration,
        /// Detection predicate.
        matcher: Arc<DetectionMatcher>,
    },
}

impl std::fmt::Debug for DetectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleShot { verdict_timeout, .. } => f
                .debug_struct("SingleShot")
                .field("verdict_timeout", verdict_timeout)
                .finish_non_exhaustive(),
            Self::Polling {
                max_attempts,
                interval,
                ..
            } => f
                .debug_struct("Polling")
                .field("max_attempts", max_attempts)
                .field("interval", interval)
                .finish_non_exhaustive(),
        }
    }
}

/// Collaborators shared by every slot worker.
pub struct WorkerContext {
    /// PTZ control.
    pub camera: Arc<dyn CameraControl>,
    /// The single camera lock.
    pub lock: CameraLock,
    /// Detection strategy.
    pub strategy: DetectionStrategy,
    /// Wait after repositioning before detection starts.
    pub settle: Duration,
    /// Result queue drained by the orchestrator.
    pub verdicts: VerdictSender,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("lock", &self.lock)
            .field("strategy", &self.strategy)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Cancelled before a verdict was posted.
    Cancelled,
    /// Verdict delivered to the result queue.
    Reported(Verdict),
    /// Verdict produced but the result queue was gone.
    Undelivered(Verdict),
}

/// One verification run for one slot.
#[derive(Debug, Clone)]
pub struct SlotWorker {
    slot_id: SlotId,
    preset: PresetId,
    ctx: Arc<WorkerContext>,
}

impl SlotWorker {
    /// Create a worker for `slot_id` aimed at `preset`.
    pub fn new(slot_id: SlotId, preset: PresetId, ctx: Arc<WorkerContext>) -> Self {
        Self {
            slot_id,
            preset,
            ctx,
        }
    }

    /// Slot this worker verifies.
    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// Execute the run until a verdict is posted or `token` fires.
    pub async fn run(self, token: CancellationToken) -> WorkerExit {
        let slot = self.slot_id;
        if token.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        tracing::info!(slot_id = slot, preset = self.preset, "slot worker started");

        let lease = match self.ctx.lock.acquire(slot, &token).await {
            Ok(lease) => lease,
            Err(LockError::Timeout(_)) => {
                return self.post(Verdict::failed(slot, 0), &token).await;
            }
            Err(e) => {
                tracing::debug!(slot_id = slot, error = %e, "stopped waiting for camera");
                return WorkerExit::Cancelled;
            }
        };

        let exit = match self.verify(&token).await {
            Some(verdict) => self.post(verdict, &token).await,
            None => {
                tracing::info!(slot_id = slot, "slot worker cancelled");
                WorkerExit::Cancelled
            }
        };

        if let Err(e) = lease.release() {
            tracing::error!(slot_id = slot, error = %e, "camera release failed");
        }
        exit
    }

    /// Steps run under the camera lease. `None` means cancelled.
    async fn verify(&self, token: &CancellationToken) -> Option<Verdict> {
        let slot = self.slot_id;

        // Not raced against the token: a dropped request could still move the
        // camera after the lease has passed to another slot.
        let moved = self.ctx.camera.move_to_preset(self.preset).await;
        if token.is_cancelled() {
            return None;
        }
        if let Err(e) = moved {
            tracing::warn!(slot_id = slot, preset = self.preset, error = %e, "reposition failed");
            return Some(Verdict::failed(slot, 0));
        }

        tracing::debug!(
            slot_id = slot,
            settle_ms = self.ctx.settle.as_millis() as u64,
            "waiting for camera to settle"
        );
        if !sleep_or_cancel(self.ctx.settle, token).await {
            return None;
        }

        match &self.ctx.strategy {
            DetectionStrategy::SingleShot {
                frames,
                jobs,
                verdict_timeout,
            } => {
                self.single_shot(frames.as_ref(), jobs, *verdict_timeout, token)
                    .await
            }
            DetectionStrategy::Polling {
                feed,
                max_attempts,
                interval,
                matcher,
            } => {
                // Subscribe only once settled; nothing seen mid-move counts for this slot.
                let window = PollWindow {
                    max_attempts: *max_attempts,
                    interval: *interval,
                    settled_at: now_ms(),
                };
                let reader = feed.subscribe();
                self.poll(&reader, window, matcher, token).await
            }
        }
    }

    async fn single_shot(
        &self,
        frames: &dyn FrameSource,
        jobs: &JobQueue,
        verdict_timeout: Duration,
        token: &CancellationToken,
    ) -> Option<Verdict> {
        let slot = self.slot_id;
        let captured = tokio::select! {
            biased;
            () = token.cancelled() => return None,
            res = frames.capture_frame(slot) => res,
        };
        let path = match captured {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(slot_id = slot, error = %e, "frame capture failed");
                return Some(Verdict::failed(slot, 1));
            }
        };

        let (job, reply) = Job::new(slot, path);
        let job_id = job.id;
        if let Err(e) = jobs.submit(job) {
            tracing::warn!(slot_id = slot, error = %e, "job submission failed");
            return Some(Verdict::failed(slot, 1));
        }

        tokio::select! {
            biased;
            () = token.cancelled() => None,
            res = tokio::time::timeout(verdict_timeout, reply) => match res {
                Ok(Ok(verdict)) => Some(verdict),
                Ok(Err(_)) => {
                    tracing::warn!(slot_id = slot, job_id = %job_id, "job dropped unanswered");
                    Some(Verdict::failed(slot, 1))
                }
                Err(_) => {
                    tracing::warn!(slot_id = slot, job_id = %job_id, "no verdict before timeout");
                    Some(Verdict::failed(slot, 1))
                }
            },
        }
    }

    async fn poll(
        &self,
        reader: &FeedReader,
        window: PollWindow,
        matcher: &DetectionMatcher,
        token: &CancellationToken,
    ) -> Option<Verdict> {
        let slot = self.slot_id;
        let PollWindow {
            max_attempts,
            interval,
            settled_at,
        } = window;
        for attempt in 1..=max_attempts {
            if token.is_cancelled() {
                return None;
            }
            let batch = reader.read();
            // A shared buffer can still hold lines read before the camera settled.
            let positive = batch
                .events
                .iter()
                .filter(|event| event.timestamp_ms >= settled_at)
                .any(|event| matcher.is_positive(&event.raw));
            if positive {
                tracing::info!(slot_id = slot, attempt, "vehicle detected");
                return Some(Verdict::new(slot, true, attempt));
            }
            if batch.terminated {
                tracing::warn!(slot_id = slot, attempt, "detection feed ended while polling");
                return Some(Verdict::failed(slot, attempt));
            }
            tracing::debug!(
                slot_id = slot,
                attempt,
                events = batch.events.len(),
                "no detection yet"
            );
            if attempt < max_attempts && !sleep_or_cancel(interval, token).await {
                return None;
            }
        }
        Some(Verdict::failed(slot, max_attempts))
    }

    async fn post(&self, verdict: Verdict, token: &CancellationToken) -> WorkerExit {
        if self.ctx.verdicts.post(verdict, token).await {
            tracing::info!(
                slot_id = verdict.slot_id,
                success = verdict.success,
                attempts = verdict.attempts,
                "verdict posted"
            );
            WorkerExit::Reported(verdict)
        } else if token.is_cancelled() {
            WorkerExit::Cancelled
        } else {
            WorkerExit::Undelivered(verdict)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PollWindow {
    max_attempts: u32,
    interval: Duration,
    /// Events stamped earlier than this predate the settled pose.
    settled_at: u128,
}

/// Sleep for `duration`. Returns false if `token` fired first.
async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
