//! Seams to the external collaborators the core drives but does not implement.
//!
//! Production implementations live under `infra`; tests substitute fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;
use tokio::process::Child;

use crate::core::{BackendError, VerifierError};
use crate::util::{PresetId, SlotId};

/// PTZ camera control.
///
/// Network failures (timeout, auth rejection, refused connection) all
/// collapse into `VerifierError::RepositionFailed`.
#[async_trait]
pub trait CameraControl: Send + Sync + 'static {
    /// Move the camera head to a stored preset.
    async fn move_to_preset(&self, preset: PresetId) -> Result<(), VerifierError>;
}

/// Single-frame acquisition from the camera stream.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    /// Capture one frame for `slot` and return a reference the backend can read.
    async fn capture_frame(&self, slot: SlotId) -> Result<PathBuf, VerifierError>;
}

/// External single-shot detection backend.
///
/// `instance` names the backend instance (e.g. a container name) so it can
/// be reclaimed and torn down by name.
#[async_trait]
pub trait DetectionBackend: Send + Sync + 'static {
    /// One-time preflight before serving jobs.
    async fn prepare(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Run one detection over `source` and return the backend's textual report.
    ///
    /// The future may be dropped on timeout; implementations must not leave
    /// a local process running when that happens.
    async fn detect(&self, instance: &str, source: &Path) -> Result<String, BackendError>;

    /// Remove the named instance if it exists. Must tolerate a missing instance.
    async fn teardown(&self, instance: &str);
}

/// Live output of a long-lived streaming backend.
pub struct BackendStream {
    /// Line-oriented report stream.
    pub lines: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Local process driving the backend, if any.
    pub child: Option<Child>,
}

impl std::fmt::Debug for BackendStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendStream")
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

/// External streaming detection backend.
#[async_trait]
pub trait StreamingBackend: Send + Sync + 'static {
    /// Start the named instance and return its output stream.
    async fn open(&self, instance: &str) -> Result<BackendStream, BackendError>;

    /// Ask the instance to terminate gracefully.
    async fn request_stop(&self, instance: &str);

    /// Remove the named instance if it exists.
    async fn teardown(&self, instance: &str);
}

/// Read-only environment sensor.
pub trait EnvironmentSensor: Send + Sync + 'static {
    /// Current temperature in degrees Celsius.
    fn read_celsius(&self) -> Result<f32, VerifierError>;
}

/// Target values computed by the orchestrator for the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorCommand {
    /// Cooling level, 0 to 100.
    pub cooling_level: u8,
    /// Whether the occupancy alert indicator should be on.
    pub alert: bool,
}

/// Physical outputs (fan, alert light).
pub trait Actuator: Send + Sync + 'static {
    /// Apply the latest targets.
    fn apply(&self, command: ActuatorCommand);
}
