//! Reconciliation loop over slot occupancy.
//!
//! The orchestrator is the only owner of the slot registry and of the
//! worker handles. Every tick it
//!
//! 1. spawns a [`SlotWorker`] for each occupied slot without a handle and
//!    cancels, joins and deregisters the handle of each vacant slot;
//! 2. drains the verdict mailbox into per-slot verification state;
//! 3. samples the environment sensor and pushes cooling and alert targets
//!    to the actuator;
//! 4. supervises the streaming backend and restarts it within the
//!    configured budget.
//!
//! A handle whose run already finished stays registered while the slot is
//! occupied, so each vacant-to-occupied edge yields exactly one run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
use crate::core::{
    Actuator, ActuatorCommand, CameraControl, CameraLock, CoolingPolicy, DetectionBackend,
    DetectionMatcher, DetectionStrategy, EnvironmentSensor, FrameSource, InferenceWorker,
    RestartPolicy, SlotRegistry, SlotWorker, StreamExit, StreamingBackend,
    StreamingInferenceWorker, Verdict, VerifierError, WorkerContext, WorkerExit,
};
use crate::infra::mailbox::{VerdictMailbox, VerdictReceiver};
use crate::infra::queue::{DetectionFeed, FeedPolicy, JobQueue};
use crate::util::{PresetId, SlotId, SlotState};

/// Timing and policy knobs for the orchestrator and the workers it spawns.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Wait after repositioning before detection.
    pub settle: Duration,
    /// Delay between polling reads.
    pub poll_interval: Duration,
    /// Polling reads before giving up.
    pub max_attempts: u32,
    /// Hard bound on one single-shot backend invocation.
    pub inference_timeout: Duration,
    /// Extra wait for a verdict beyond the inference timeout (teardown time).
    pub verdict_grace: Duration,
    /// Reconciliation period.
    pub tick_interval: Duration,
    /// Optional bound on camera lock acquisition.
    pub lock_timeout: Option<Duration>,
    /// Events buffered per feed reader.
    pub feed_capacity: usize,
    /// Grace period between a stop request and a forced kill.
    pub stop_grace: Duration,
    /// Prefix for backend instance names.
    pub instance_prefix: String,
    /// Temperature to cooling level mapping.
    pub cooling: CoolingPolicy,
    /// Streaming backend restart budget.
    pub restart: RestartPolicy,
    /// Audit events retained in memory.
    pub audit_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            max_attempts: 3,
            inference_timeout: Duration::from_secs(30),
            verdict_grace: Duration::from_secs(25),
            tick_interval: Duration::from_millis(100),
            lock_timeout: None,
            feed_capacity: 32,
            stop_grace: Duration::from_secs(5),
            instance_prefix: "slotwatch".into(),
            cooling: CoolingPolicy::default(),
            restart: RestartPolicy::default(),
            audit_capacity: 1024,
        }
    }
}

impl OrchestratorSettings {
    /// Set the settle wait.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the polling delay and attempt budget.
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Set the single-shot inference timeout.
    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    /// Set the extra verdict wait.
    pub fn with_verdict_grace(mut self, grace: Duration) -> Self {
        self.verdict_grace = grace;
        self
    }

    /// Set the reconciliation period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Bound camera lock acquisition.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the per-reader feed capacity.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Set the stop escalation grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Set the backend instance name prefix.
    pub fn with_instance_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.instance_prefix = prefix.into();
        self
    }

    /// Set the cooling policy.
    pub fn with_cooling(mut self, cooling: CoolingPolicy) -> Self {
        self.cooling = cooling;
        self
    }

    /// Set the streaming restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".into());
        }
        if self.inference_timeout.is_zero() {
            return Err("inference_timeout must be > 0".into());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be > 0".into());
        }
        if self.feed_capacity == 0 {
            return Err("feed_capacity must be > 0".into());
        }
        if self.instance_prefix.trim().is_empty() {
            return Err("instance_prefix must not be empty".into());
        }
        self.cooling.validate()
    }
}

/// Detection backend variant driven by the orchestrator.
#[derive(Clone)]
pub enum DetectionEngine {
    /// One backend invocation per captured frame.
    SingleShot {
        /// Backend invoked per job.
        backend: Arc<dyn DetectionBackend>,
        /// Frame grabber used by slot workers.
        frames: Arc<dyn FrameSource>,
    },
    /// One long-lived backend publishing a line stream.
    Streaming {
        /// Streaming backend.
        backend: Arc<dyn StreamingBackend>,
        /// Distribution of events among polling workers.
        policy: FeedPolicy,
    },
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleShot { .. } => f.write_str("SingleShot"),
            Self::Streaming { policy, .. } => {
                f.debug_struct("Streaming").field("policy", policy).finish()
            }
        }
    }
}

/// Handle to one running slot worker.
#[derive(Debug)]
pub struct SlotWorkerHandle {
    task: JoinHandle<WorkerExit>,
    token: CancellationToken,
}

impl SlotWorkerHandle {
    /// Whether the run has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the run and wait for it to end. A finished run is left as is.
    pub async fn cancel_and_join(self, slot_id: SlotId) -> Option<WorkerExit> {
        self.token.cancel();
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) if e.is_panic() => {
                tracing::error!(slot_id, "slot worker panicked");
                None
            }
            Err(e) => {
                tracing::warn!(slot_id, error = %e, "slot worker join failed");
                None
            }
        }
    }
}

/// Per-slot view exposed to status consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    /// Slot identifier.
    pub id: SlotId,
    /// Camera preset.
    pub preset: PresetId,
    /// Reported occupancy.
    pub occupied: bool,
    /// Verification state.
    pub state: SlotState,
    /// Whether a worker handle is registered.
    pub worker_active: bool,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Slots whose worker was spawned.
    pub spawned: Vec<SlotId>,
    /// Slots whose worker was cancelled and joined.
    pub cancelled: Vec<SlotId>,
    /// Verdicts applied this tick.
    pub verdicts: Vec<Verdict>,
    /// Sensor reading used for the cooling decision.
    pub temperature: f32,
    /// Command sent to the actuator.
    pub command: ActuatorCommand,
    /// Whether the streaming backend was restarted.
    pub backend_restarted: bool,
}

type StreamTask = JoinHandle<Result<StreamExit, VerifierError>>;

enum InferenceRuntime {
    SingleShot {
        worker: Arc<InferenceWorker>,
        jobs: JobQueue,
        task: Option<JoinHandle<()>>,
    },
    Streaming {
        worker: Arc<StreamingInferenceWorker>,
        task: Option<StreamTask>,
        restarts: u32,
        exhausted: bool,
    },
}

/// Spawns, cancels and joins slot workers and turns their verdicts into
/// actuator targets.
pub struct Orchestrator {
    registry: SlotRegistry,
    ctx: Arc<WorkerContext>,
    verdicts: VerdictReceiver,
    handles: HashMap<SlotId, SlotWorkerHandle>,
    states: BTreeMap<SlotId, SlotState>,
    inference: InferenceRuntime,
    sensor: Arc<dyn EnvironmentSensor>,
    actuator: Arc<dyn Actuator>,
    settings: OrchestratorSettings,
    audit: InMemoryAuditSink,
    workers_token: CancellationToken,
    inference_token: CancellationToken,
    last_command: ActuatorCommand,
    last_temperature: f32,
    started: bool,
    stopped: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("slots", &self.registry.len())
            .field("active", &self.handles.len())
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire an orchestrator. Nothing runs until [`Orchestrator::start`].
    pub fn new(
        registry: SlotRegistry,
        camera: Arc<dyn CameraControl>,
        engine: DetectionEngine,
        sensor: Arc<dyn EnvironmentSensor>,
        actuator: Arc<dyn Actuator>,
        matcher: DetectionMatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        let matcher = Arc::new(matcher);
        let (sender, verdicts) = VerdictMailbox::channel((registry.len() * 2).max(2));

        let (strategy, inference) = match engine {
            DetectionEngine::SingleShot { backend, frames } => {
                let jobs = JobQueue::new();
                let worker = InferenceWorker::new(
                    backend,
                    jobs.clone(),
                    Arc::clone(&matcher),
                    settings.inference_timeout,
                    &settings.instance_prefix,
                );
                (
                    DetectionStrategy::SingleShot {
                        frames,
                        jobs: jobs.clone(),
                        verdict_timeout: settings.inference_timeout + settings.verdict_grace,
                    },
                    InferenceRuntime::SingleShot {
                        worker: Arc::new(worker),
                        jobs,
                        task: None,
                    },
                )
            }
            DetectionEngine::Streaming { backend, policy } => {
                let feed = DetectionFeed::new(policy, settings.feed_capacity);
                let worker = StreamingInferenceWorker::new(
                    backend,
                    feed.clone(),
                    settings.stop_grace,
                    &settings.instance_prefix,
                );
                (
                    DetectionStrategy::Polling {
                        feed,
                        max_attempts: settings.max_attempts,
                        interval: settings.poll_interval,
                        matcher,
                    },
                    InferenceRuntime::Streaming {
                        worker: Arc::new(worker),
                        task: None,
                        restarts: 0,
                        exhausted: false,
                    },
                )
            }
        };

        let ctx = Arc::new(WorkerContext {
            camera,
            lock: CameraLock::with_acquire_timeout(settings.lock_timeout),
            strategy,
            settle: settings.settle,
            verdicts: sender,
        });

        Self {
            registry,
            ctx,
            verdicts,
            handles: HashMap::new(),
            states: BTreeMap::new(),
            inference,
            sensor,
            actuator,
            audit: InMemoryAuditSink::new(settings.audit_capacity),
            settings,
            workers_token: CancellationToken::new(),
            inference_token: CancellationToken::new(),
            last_command: ActuatorCommand::default(),
            last_temperature: 0.0,
            started: false,
            stopped: false,
        }
    }

    /// Start the inference worker.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::InferenceStart` if the backend cannot be
    /// started. This is unrecoverable; the caller should shut down.
    pub async fn start(&mut self) -> Result<(), VerifierError> {
        if self.started {
            return Ok(());
        }
        if self.stopped {
            return Err(VerifierError::InferenceStart("orchestrator already shut down".into()));
        }
        let token = self.inference_token.clone();
        match &mut self.inference {
            InferenceRuntime::SingleShot { worker, task, .. } => {
                worker.prepare().await?;
                let worker = Arc::clone(worker);
                *task = Some(tokio::spawn(async move { worker.run(token).await }));
            }
            InferenceRuntime::Streaming { worker, task, .. } => {
                let lines = worker.open().await?;
                let worker = Arc::clone(worker);
                *task = Some(tokio::spawn(async move { Ok(worker.pump(lines, token).await) }));
            }
        }
        self.started = true;
        tracing::info!(slots = self.registry.len(), "orchestrator started");
        Ok(())
    }

    /// Run one reconciliation pass.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.stopped {
            return report;
        }

        self.reconcile(&mut report).await;
        self.apply_verdicts(&mut report);
        self.drive_actuator(&mut report);
        report.backend_restarted = self.supervise_backend().await;
        report
    }

    async fn reconcile(&mut self, report: &mut TickReport) {
        for slot in self.registry.snapshot() {
            let registered = self.handles.contains_key(&slot.id);
            if slot.occupied && !registered {
                self.spawn_worker(slot.id, slot.preset);
                report.spawned.push(slot.id);
            } else if !slot.occupied && registered {
                if let Some(handle) = self.handles.remove(&slot.id) {
                    let finished = handle.is_finished();
                    let exit = handle.cancel_and_join(slot.id).await;
                    tracing::info!(
                        slot_id = slot.id,
                        finished,
                        ?exit,
                        "slot vacated, worker deregistered"
                    );
                    self.record(Some(slot.id), AuditAction::Cancel, exit.map(|e| format!("{e:?}")));
                }
                self.states.remove(&slot.id);
                report.cancelled.push(slot.id);
            }
        }
    }

    fn spawn_worker(&mut self, slot_id: SlotId, preset: PresetId) {
        let token = self.workers_token.child_token();
        let worker = SlotWorker::new(slot_id, preset, Arc::clone(&self.ctx));
        let task = tokio::spawn(worker.run(token.clone()));
        self.handles.insert(slot_id, SlotWorkerHandle { task, token });
        self.states.insert(slot_id, SlotState::Pending);
        tracing::info!(slot_id, preset, "slot occupied, worker spawned");
        self.record(Some(slot_id), AuditAction::Spawn, None);
    }

    fn apply_verdicts(&mut self, report: &mut TickReport) {
        for verdict in self.verdicts.drain() {
            if !self.handles.contains_key(&verdict.slot_id) {
                tracing::debug!(slot_id = verdict.slot_id, "verdict for vacated slot ignored");
                continue;
            }
            let state = if verdict.success {
                SlotState::Verified
            } else {
                SlotState::Unverified
            };
            self.states.insert(verdict.slot_id, state);
            tracing::info!(
                slot_id = verdict.slot_id,
                state = state.as_str(),
                attempts = verdict.attempts,
                "verdict applied"
            );
            self.record(
                Some(verdict.slot_id),
                AuditAction::Verdict,
                Some(format!("{} after {} attempt(s)", state.as_str(), verdict.attempts)),
            );
            report.verdicts.push(verdict);
        }
    }

    fn drive_actuator(&mut self, report: &mut TickReport) {
        let temperature = match self.sensor.read_celsius() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "sensor read failed, assuming 0");
                0.0
            }
        };
        let command = ActuatorCommand {
            cooling_level: self.settings.cooling.level(temperature),
            alert: self.states.values().any(|s| *s == SlotState::Verified),
        };
        if command != self.last_command {
            tracing::debug!(
                temperature,
                cooling_level = command.cooling_level,
                alert = command.alert,
                "actuator targets changed"
            );
        }
        self.actuator.apply(command);
        self.last_command = command;
        self.last_temperature = temperature;
        report.temperature = temperature;
        report.command = command;
    }

    async fn supervise_backend(&mut self) -> bool {
        let restart_policy = self.settings.restart;
        let token = self.inference_token.clone();
        let InferenceRuntime::Streaming {
            worker,
            task,
            restarts,
            exhausted,
        } = &mut self.inference
        else {
            return false;
        };
        if !task.as_ref().is_some_and(JoinHandle::is_finished) {
            return false;
        }
        let Some(finished) = task.take() else {
            return false;
        };
        let reason = match finished.await {
            Ok(Ok(StreamExit::Shutdown)) => return false,
            Ok(Ok(exit)) => format!("{exit:?}"),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        if !restart_policy.allows(*restarts) {
            if !*exhausted {
                *exhausted = true;
                tracing::error!(
                    restarts = *restarts,
                    reason = %reason,
                    "streaming backend down, restart budget exhausted"
                );
            }
            return false;
        }

        *restarts += 1;
        let attempt = *restarts;
        tracing::warn!(attempt, reason = %reason, "restarting streaming backend");
        let worker = Arc::clone(worker);
        *task = Some(tokio::spawn(async move {
            let lines = worker.restart().await?;
            Ok(worker.pump(lines, token).await)
        }));
        let detail = format!("attempt {attempt}: {reason}");
        self.record(None, AuditAction::BackendRestart, Some(detail));
        true
    }

    /// Tick every `tick_interval` until `shutdown` fires, then shut down.
    ///
    /// # Errors
    ///
    /// Returns the start error if the inference worker cannot be started;
    /// everything is shut down before returning.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), VerifierError> {
        if let Err(e) = self.start().await {
            tracing::error!(error = %e, "orchestrator cannot start");
            self.shutdown().await;
            return Err(e);
        }

        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    /// Cancel and join every worker, then stop the inference worker. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.workers_token.cancel();
        let handles: Vec<_> = self.handles.drain().collect();
        for (slot_id, handle) in handles {
            let exit = handle.cancel_and_join(slot_id).await;
            tracing::debug!(slot_id, ?exit, "worker joined on shutdown");
        }
        self.states.clear();
        self.ctx.lock.close();

        self.inference_token.cancel();
        match &mut self.inference {
            InferenceRuntime::SingleShot { jobs, task, .. } => {
                jobs.close();
                if let Some(task) = task.take() {
                    if let Err(e) = task.await {
                        tracing::warn!(error = %e, "inference worker join failed");
                    }
                }
            }
            InferenceRuntime::Streaming { worker, task, .. } => {
                if let Some(task) = task.take() {
                    if let Err(e) = task.await {
                        tracing::warn!(error = %e, "stream pump join failed");
                    }
                }
                worker.stop().await;
            }
        }

        self.last_command = ActuatorCommand::default();
        self.actuator.apply(self.last_command);
        tracing::info!("orchestrator stopped");
    }

    fn record(&mut self, slot_id: Option<SlotId>, action: AuditAction, detail: Option<String>) {
        self.audit.record(build_audit_event(slot_id, action, detail));
    }

    /// Slot registry.
    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// Slots with a registered worker handle, ascending.
    pub fn active_slots(&self) -> Vec<SlotId> {
        let mut slots: Vec<_> = self.handles.keys().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Verification state of every registered slot.
    pub fn slot_statuses(&self) -> Vec<SlotStatus> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|slot| SlotStatus {
                id: slot.id,
                preset: slot.preset,
                occupied: slot.occupied,
                state: if slot.occupied {
                    self.states.get(&slot.id).copied().unwrap_or(SlotState::Pending)
                } else {
                    SlotState::Vacant
                },
                worker_active: self.handles.contains_key(&slot.id),
            })
            .collect()
    }

    /// Slot currently holding the camera.
    pub fn camera_holder(&self) -> Option<SlotId> {
        self.ctx.lock.holder()
    }

    /// Last command sent to the actuator.
    pub fn last_command(&self) -> ActuatorCommand {
        self.last_command
    }

    /// Last temperature sample.
    pub fn last_temperature(&self) -> f32 {
        self.last_temperature
    }

    /// Streaming backend restarts so far. Always 0 in single-shot mode.
    pub fn backend_restarts(&self) -> u32 {
        match &self.inference {
            InferenceRuntime::Streaming { restarts, .. } => *restarts,
            InferenceRuntime::SingleShot { .. } => 0,
        }
    }

    /// Whether the inference worker is running.
    pub fn backend_running(&self) -> bool {
        match &self.inference {
            InferenceRuntime::SingleShot { task, .. } => {
                task.as_ref().is_some_and(|t| !t.is_finished())
            }
            InferenceRuntime::Streaming { task, .. } => {
                task.as_ref().is_some_and(|t| !t.is_finished())
            }
        }
    }

    /// Whether [`Orchestrator::shutdown`] has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Settings in effect.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Recorded lifecycle events, oldest first.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.events()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if !self.stopped {
            self.workers_token.cancel();
            self.inference_token.cancel();
        }
    }
}
