//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};

use slotwatch::core::{
    Actuator, ActuatorCommand, BackendError, BackendStream, CameraControl, CameraLock,
    DetectionBackend, DetectionStrategy, EnvironmentSensor, FrameSource, StreamingBackend,
    VerifierError, WorkerContext,
};
use slotwatch::infra::{VerdictMailbox, VerdictReceiver};
use slotwatch::util::{PresetId, SlotId};

// ============================================================================
// CAMERA
// ============================================================================

/// PTZ fake recording moves and overlapping calls.
#[derive(Default)]
pub struct FakeCamera {
    pub delay: Duration,
    pub moves: Mutex<Vec<PresetId>>,
    pub failing: Mutex<HashSet<PresetId>>,
    pub panicking: Mutex<HashSet<PresetId>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCamera {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn fail_preset(&self, preset: PresetId) {
        self.failing.lock().insert(preset);
    }

    pub fn panic_on(&self, preset: PresetId) {
        self.panicking.lock().insert(preset);
    }

    pub fn moves(&self) -> Vec<PresetId> {
        self.moves.lock().clone()
    }

    pub fn moves_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_moves(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraControl for FakeCamera {
    async fn move_to_preset(&self, preset: PresetId) -> Result<(), VerifierError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.moves.lock().push(preset);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.lock().contains(&preset) {
            panic!("camera driver crashed on preset {preset}");
        }
        if self.failing.lock().contains(&preset) {
            return Err(VerifierError::RepositionFailed("connection refused".into()));
        }
        Ok(())
    }
}

// ============================================================================
// FRAMES
// ============================================================================

#[derive(Default)]
pub struct FakeFrames {
    pub fail: AtomicBool,
    pub captures: AtomicUsize,
}

impl FakeFrames {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn capture_frame(&self, slot: SlotId) -> Result<PathBuf, VerifierError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VerifierError::CaptureFailed("stream unavailable".into()));
        }
        Ok(PathBuf::from(format!("/tmp/fake-captures/slot_{slot}.jpg")))
    }
}

// ============================================================================
// SINGLE-SHOT BACKEND
// ============================================================================

/// Backend fake tracking live named instances.
pub struct FakeBackend {
    pub output: Mutex<String>,
    pub delay: Mutex<Duration>,
    pub crash: AtomicBool,
    pub fail_prepare: AtomicBool,
    pub processed: Mutex<Vec<PathBuf>>,
    pub live: Mutex<HashSet<String>>,
    pub teardowns: AtomicUsize,
}

impl FakeBackend {
    pub fn new(output: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Mutex::new(output.to_string()),
            delay: Mutex::new(Duration::from_millis(5)),
            crash: AtomicBool::new(false),
            fail_prepare: AtomicBool::new(false),
            processed: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            teardowns: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = delay;
        self
    }

    pub fn live_instances(&self) -> usize {
        self.live.lock().len()
    }

    pub fn processed(&self) -> Vec<PathBuf> {
        self.processed.lock().clone()
    }
}

#[async_trait]
impl DetectionBackend for FakeBackend {
    async fn prepare(&self) -> Result<(), BackendError> {
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(BackendError::Preflight("docker daemon not reachable".into()));
        }
        Ok(())
    }

    async fn detect(&self, instance: &str, source: &Path) -> Result<String, BackendError> {
        self.live.lock().insert(instance.to_string());
        self.processed.lock().push(source.to_path_buf());
        let delay = *self.delay.lock();
        tokio::time::sleep(delay).await;
        if self.crash.load(Ordering::SeqCst) {
            return Err(BackendError::Crashed("exit status: 139".into()));
        }
        Ok(self.output.lock().clone())
    }

    async fn teardown(&self, instance: &str) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.live.lock().remove(instance);
    }
}

// ============================================================================
// STREAMING BACKEND
// ============================================================================

/// Streaming fake backed by an in-memory pipe the test writes into.
#[derive(Default)]
pub struct FakeStream {
    writer: tokio::sync::Mutex<Option<DuplexStream>>,
    pub fail_open: AtomicBool,
    pub opens: AtomicUsize,
    pub stop_requests: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl FakeStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Write one output line. Returns false if no stream is open.
    pub async fn emit(&self, line: &str) -> bool {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write_all(format!("{line}\n").as_bytes()).await.is_ok(),
            None => false,
        }
    }

    /// End the current stream (the backend exited).
    pub async fn close(&self) {
        self.writer.lock().await.take();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamingBackend for FakeStream {
    async fn open(&self, _instance: &str) -> Result<BackendStream, BackendError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Spawn("no such image".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (reader, writer) = tokio::io::duplex(16 * 1024);
        *self.writer.lock().await = Some(writer);
        Ok(BackendStream {
            lines: Box::new(BufReader::new(reader)),
            child: None,
        })
    }

    async fn request_stop(&self, _instance: &str) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.writer.lock().await.take();
    }

    async fn teardown(&self, _instance: &str) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SENSOR / ACTUATOR
// ============================================================================

/// Sensor returning scripted readings, then repeating the last one.
pub struct SequenceSensor {
    readings: Mutex<VecDeque<f32>>,
    last: Mutex<Option<f32>>,
}

impl SequenceSensor {
    pub fn new(readings: &[f32]) -> Arc<Self> {
        Arc::new(Self {
            readings: Mutex::new(readings.iter().copied().collect()),
            last: Mutex::new(None),
        })
    }
}

impl EnvironmentSensor for SequenceSensor {
    fn read_celsius(&self) -> Result<f32, VerifierError> {
        let next = self.readings.lock().pop_front();
        let mut last = self.last.lock();
        if next.is_some() {
            *last = next;
        }
        last.ok_or_else(|| VerifierError::Sensor("no reading".into()))
    }
}

#[derive(Default)]
pub struct RecordingActuator {
    pub commands: Mutex<Vec<ActuatorCommand>>,
}

impl RecordingActuator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().clone()
    }

    pub fn last(&self) -> Option<ActuatorCommand> {
        self.commands.lock().last().copied()
    }
}

impl Actuator for RecordingActuator {
    fn apply(&self, command: ActuatorCommand) {
        self.commands.lock().push(command);
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Worker context over `camera` with a fresh lock and mailbox.
pub fn worker_context(
    camera: Arc<FakeCamera>,
    strategy: DetectionStrategy,
    settle: Duration,
    lock: CameraLock,
) -> (Arc<WorkerContext>, VerdictReceiver) {
    let (verdicts, rx) = VerdictMailbox::channel(8);
    let ctx = WorkerContext {
        camera,
        lock,
        strategy,
        settle,
        verdicts,
    };
    (Arc::new(ctx), rx)
}

/// Poll `pred` every few milliseconds until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut pred: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
