//! Inference workers: the single-shot job server and the streaming feed producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{
    BackendError, DetectionBackend, DetectionEvent, DetectionMatcher, Job, StreamingBackend,
    VerifierError,
};
use crate::infra::queue::{DetectionFeed, JobQueue};

fn instance_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Serves single-shot detection jobs one at a time.
///
/// Every job runs against a freshly reclaimed backend instance with a fixed
/// name, under a hard timeout, and the instance is torn down afterwards no
/// matter how the job ended.
pub struct InferenceWorker {
    backend: Arc<dyn DetectionBackend>,
    jobs: JobQueue,
    matcher: Arc<DetectionMatcher>,
    timeout: Duration,
    instance: String,
}

impl std::fmt::Debug for InferenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceWorker")
            .field("instance", &self.instance)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl InferenceWorker {
    /// Create a worker pulling from `jobs`. Instance names start with `instance_prefix`.
    pub fn new(
        backend: Arc<dyn DetectionBackend>,
        jobs: JobQueue,
        matcher: Arc<DetectionMatcher>,
        timeout: Duration,
        instance_prefix: &str,
    ) -> Self {
        Self {
            backend,
            jobs,
            matcher,
            timeout,
            instance: instance_name(instance_prefix),
        }
    }

    /// Backend instance name used for every job.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Run the backend preflight.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::InferenceStart` if the backend cannot serve jobs.
    pub async fn prepare(&self) -> Result<(), VerifierError> {
        self.backend.prepare().await.map_err(|e| {
            tracing::error!(
                instance = %self.instance,
                error = %e,
                "inference backend preflight failed"
            );
            VerifierError::InferenceStart(e.to_string())
        })?;
        self.backend.teardown(&self.instance).await;
        tracing::info!(instance = %self.instance, "inference worker ready");
        Ok(())
    }

    /// Serve jobs until `shutdown` fires or the queue closes.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            let job = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                job = self.jobs.next() => job,
            };
            let Some(job) = job else {
                tracing::debug!("job queue closed");
                break;
            };
            let slot_id = job.slot_id;
            let job_id = job.id;
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!(slot_id, job_id = %job_id, "job abandoned on shutdown");
                    self.backend.teardown(&self.instance).await;
                    break;
                }
                _ = self.process(job) => {}
            }
        }
        tracing::info!(instance = %self.instance, "inference worker stopped");
    }

    /// Run one job and answer it. Returns the detection outcome.
    pub async fn process(&self, job: Job) -> bool {
        let slot_id = job.slot_id;
        self.backend.teardown(&self.instance).await;

        let started = std::time::Instant::now();
        let outcome = match tokio::time::timeout(
            self.timeout,
            self.backend.detect(&self.instance, &job.capture),
        )
        .await
        {
            Ok(Ok(output)) => Ok(self.matcher.is_positive(&output)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BackendError::Timeout(self.timeout.as_secs())),
        };
        self.backend.teardown(&self.instance).await;

        let success = match outcome {
            Ok(success) => {
                tracing::info!(
                    slot_id,
                    job_id = %job.id,
                    success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "inference finished"
                );
                success
            }
            Err(e) => {
                tracing::warn!(slot_id, job_id = %job.id, error = %e, "inference failed");
                false
            }
        };

        if !job.respond(success) {
            tracing::debug!(slot_id, "slot worker no longer waiting for verdict");
        }
        success
    }
}

/// Why a streaming pump returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// The backend closed its output.
    Eof,
    /// Reading the backend output failed.
    ReadError(String),
    /// The shutdown token fired.
    Shutdown,
}

/// Line reader over a backend's output.
pub type StreamLines = Box<dyn AsyncBufRead + Send + Unpin>;

/// Runs one long-lived streaming backend instance and publishes its output.
pub struct StreamingInferenceWorker {
    backend: Arc<dyn StreamingBackend>,
    feed: DetectionFeed,
    instance: String,
    stop_grace: Duration,
    child: Mutex<Option<Child>>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for StreamingInferenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingInferenceWorker")
            .field("instance", &self.instance)
            .field("stop_grace", &self.stop_grace)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl StreamingInferenceWorker {
    /// Create a worker publishing to `feed`.
    pub fn new(
        backend: Arc<dyn StreamingBackend>,
        feed: DetectionFeed,
        stop_grace: Duration,
        instance_prefix: &str,
    ) -> Self {
        Self {
            backend,
            feed,
            instance: instance_name(instance_prefix),
            stop_grace,
            child: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Backend instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Feed this worker publishes to.
    pub fn feed(&self) -> &DetectionFeed {
        &self.feed
    }

    /// Start the backend instance, reclaiming any leftover with the same name.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::InferenceStart` if the backend cannot be started
    /// or the worker was already stopped.
    pub async fn open(&self) -> Result<StreamLines, VerifierError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(VerifierError::InferenceStart("streaming worker stopped".into()));
        }
        self.backend.teardown(&self.instance).await;
        let stream = self.backend.open(&self.instance).await.map_err(|e| {
            tracing::error!(
                instance = %self.instance,
                error = %e,
                "streaming backend failed to start"
            );
            VerifierError::InferenceStart(e.to_string())
        })?;
        *self.child.lock() = stream.child;
        self.feed.reopen();
        tracing::info!(instance = %self.instance, "streaming backend started");
        Ok(stream.lines)
    }

    /// Publish every output line until the stream ends or `shutdown` fires.
    ///
    /// The feed is marked terminated when the stream ends on its own.
    pub async fn pump(&self, lines: StreamLines, shutdown: CancellationToken) -> StreamExit {
        let mut lines = lines.lines();
        let mut published = 0u64;
        let exit = loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break StreamExit::Shutdown,
                next = lines.next_line() => next,
            };
            match next {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let dropped = self.feed.publish(DetectionEvent::now(line));
                    published += 1;
                    if dropped > 0 {
                        tracing::trace!(dropped, "feed buffers full, oldest events dropped");
                    }
                }
                Ok(None) => break StreamExit::Eof,
                Err(e) => break StreamExit::ReadError(e.to_string()),
            }
        };

        match &exit {
            StreamExit::Shutdown => {
                tracing::debug!(instance = %self.instance, published, "stream pump stopped");
            }
            StreamExit::Eof => {
                tracing::warn!(
                    instance = %self.instance,
                    published,
                    "streaming backend output ended"
                );
                self.feed.terminate();
            }
            StreamExit::ReadError(e) => {
                tracing::warn!(
                    instance = %self.instance,
                    published,
                    error = %e,
                    "streaming backend read failed"
                );
                self.feed.terminate();
            }
        }
        exit
    }

    /// Stop the current instance and start a new one.
    ///
    /// # Errors
    ///
    /// Same as [`StreamingInferenceWorker::open`].
    pub async fn restart(&self) -> Result<StreamLines, VerifierError> {
        self.halt().await;
        self.open().await
    }

    /// Stop the backend for good. Idempotent.
    ///
    /// Escalates from a graceful stop request to a forced kill after the
    /// grace period, then removes the named instance.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.halt().await;
        self.feed.terminate();
        tracing::info!(instance = %self.instance, "streaming backend stopped");
    }

    /// Whether [`StreamingInferenceWorker::stop`] has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn halt(&self) {
        self.backend.request_stop(&self.instance).await;
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(self.stop_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(instance = %self.instance, %status, "streaming backend exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        instance = %self.instance,
                        error = %e,
                        "waiting for streaming backend failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        instance = %self.instance,
                        "streaming backend ignored stop request, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(instance = %self.instance, error = %e, "kill failed");
                    }
                }
            }
        }
        self.backend.teardown(&self.instance).await;
    }
}
