//! Verifier configuration: camera, slots, timing, detection backend and cooling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{CoolingPolicy, OrchestratorSettings, RestartPolicy};
use crate::infra::backend::CommandTemplate;
use crate::infra::queue::FeedPolicy;
use crate::util::{PresetId, SlotId};

/// Environment variable overriding the camera address.
pub const ENV_CAMERA_ADDRESS: &str = "SLOTWATCH_CAMERA_ADDRESS";
/// Environment variable overriding the camera user.
pub const ENV_CAMERA_USER: &str = "SLOTWATCH_CAMERA_USER";
/// Environment variable overriding the camera password.
pub const ENV_CAMERA_PASSWORD: &str = "SLOTWATCH_CAMERA_PASSWORD";

fn default_rtsp_stream() -> String {
    "Streaming/Channels/101".into()
}

const fn default_ptz_channel() -> u32 {
    1
}

const fn default_request_timeout_secs() -> u64 {
    5
}

const fn default_capture_timeout_secs() -> u64 {
    10
}

fn default_capture_dir() -> PathBuf {
    std::env::temp_dir().join("slotwatch-captures")
}

fn default_thermal_zone() -> PathBuf {
    PathBuf::from(crate::infra::sensor::DEFAULT_THERMAL_ZONE)
}

/// PTZ camera connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Host or `host:port` of the camera.
    #[serde(default)]
    pub address: String,
    /// HTTP digest / RTSP user.
    #[serde(default)]
    pub user: String,
    /// HTTP digest / RTSP password. Prefer the environment override.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// RTSP stream path.
    #[serde(default = "default_rtsp_stream")]
    pub rtsp_stream: String,
    /// ISAPI PTZ channel the presets belong to.
    #[serde(default = "default_ptz_channel")]
    pub ptz_channel: u32,
    /// Timeout for one ISAPI request in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for one frame capture in seconds.
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            user: String::new(),
            password: String::new(),
            rtsp_stream: default_rtsp_stream(),
            ptz_channel: default_ptz_channel(),
            request_timeout_secs: default_request_timeout_secs(),
            capture_timeout_secs: default_capture_timeout_secs(),
        }
    }
}

/// One monitored slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Explicit id; slots without one get the next sequential id.
    #[serde(default)]
    pub id: Option<SlotId>,
    /// Camera preset aimed at the slot.
    pub preset: PresetId,
}

/// Worker and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Settle wait after repositioning, in milliseconds.
    pub settle_ms: u64,
    /// Delay between polling reads, in milliseconds.
    pub poll_interval_ms: u64,
    /// Polling reads before giving up.
    pub max_attempts: u32,
    /// Hard timeout of one single-shot inference, in seconds.
    pub inference_timeout_secs: u64,
    /// Extra verdict wait beyond the inference timeout, in seconds.
    pub verdict_grace_secs: u64,
    /// Orchestrator tick period, in milliseconds.
    pub tick_interval_ms: u64,
    /// Optional camera lock acquisition timeout, in milliseconds.
    pub lock_timeout_ms: Option<u64>,
    /// Grace period before a streaming backend is killed, in seconds.
    pub stop_grace_secs: u64,
    /// Bound on cleanup, stop and preflight commands, in seconds.
    pub cleanup_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            settle_ms: settings.settle.as_millis() as u64,
            poll_interval_ms: settings.poll_interval.as_millis() as u64,
            max_attempts: settings.max_attempts,
            inference_timeout_secs: settings.inference_timeout.as_secs(),
            verdict_grace_secs: settings.verdict_grace.as_secs(),
            tick_interval_ms: settings.tick_interval.as_millis() as u64,
            lock_timeout_ms: None,
            stop_grace_secs: settings.stop_grace.as_secs(),
            cleanup_timeout_secs: 10,
        }
    }
}

/// Detection backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Capture a frame and run the detector once per verification.
    #[default]
    SingleShot,
    /// Run one detector over the live stream and poll its output.
    Streaming,
}

/// Detection backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Backend variant.
    pub mode: DetectionMode,
    /// Labels counted as a vehicle.
    pub labels: Vec<String>,
    /// Per-job command (single-shot).
    pub detect: Option<CommandTemplate>,
    /// Long-lived command (streaming).
    pub stream: Option<CommandTemplate>,
    /// Graceful stop command.
    pub stop: Option<CommandTemplate>,
    /// Instance removal command.
    pub cleanup: Option<CommandTemplate>,
    /// Preflight command.
    pub preflight: Option<CommandTemplate>,
    /// Event distribution among polling workers.
    pub feed_policy: FeedPolicy,
    /// Events buffered per feed reader.
    pub feed_capacity: usize,
    /// Streaming backend restart budget.
    pub max_restarts: u32,
    /// Prefix of backend instance names.
    pub instance_prefix: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            mode: DetectionMode::default(),
            labels: vec!["car".into(), "carro".into()],
            detect: None,
            stream: None,
            stop: None,
            cleanup: None,
            preflight: None,
            feed_policy: FeedPolicy::default(),
            feed_capacity: settings.feed_capacity,
            max_restarts: settings.restart.max_restarts,
            instance_prefix: settings.instance_prefix,
        }
    }
}

/// One scripted occupancy change for runs without an occupancy transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationStep {
    /// Delay after the previous step, in milliseconds.
    pub after_ms: u64,
    /// Slot to update.
    pub slot: SlotId,
    /// New occupancy.
    pub occupied: bool,
}

/// Scripted occupancy feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Steps applied in order.
    pub steps: Vec<SimulationStep>,
    /// Replay the script from the start after the last step.
    #[serde(default)]
    pub repeat: bool,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Camera connection.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Monitored slots.
    pub slots: Vec<SlotConfig>,
    /// Timing.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Detection backend.
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Cooling thresholds.
    #[serde(default)]
    pub cooling: CoolingPolicy,
    /// Where captured frames are written.
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
    /// Thermal zone read by the environment sensor.
    #[serde(default = "default_thermal_zone")]
    pub thermal_zone: PathBuf,
    /// Optional scripted occupancy.
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

impl VerifierConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.slots.is_empty() {
            return Err("at least one slot must be defined".into());
        }
        let mut explicit: Vec<SlotId> = self.slots.iter().filter_map(|s| s.id).collect();
        explicit.sort_unstable();
        if explicit.windows(2).any(|w| w[0] == w[1]) {
            return Err("slot ids must be unique".into());
        }
        if self.camera.address.trim().is_empty() {
            return Err(format!(
                "camera address is required (set `camera.address` or {ENV_CAMERA_ADDRESS})"
            ));
        }
        if self.camera.ptz_channel == 0 {
            return Err("camera.ptz_channel must be greater than 0".into());
        }
        if self.camera.request_timeout_secs == 0 || self.camera.capture_timeout_secs == 0 {
            return Err("camera timeouts must be greater than 0".into());
        }
        if self.detection.labels.is_empty() {
            return Err("at least one detection label is required".into());
        }
        if self.detection.labels.iter().any(|l| l.trim().is_empty()) {
            return Err("detection labels must not be blank".into());
        }
        match self.detection.mode {
            DetectionMode::SingleShot => {
                let detect = self
                    .detection
                    .detect
                    .as_ref()
                    .ok_or("single_shot mode requires `detection.detect`")?;
                detect.validate().map_err(|e| format!("detection.detect: {e}"))?;
                if !detect.uses(crate::infra::backend::template::SOURCE_PLACEHOLDER) {
                    return Err("detection.detect must reference {source}".into());
                }
            }
            DetectionMode::Streaming => {
                self.detection
                    .stream
                    .as_ref()
                    .ok_or("streaming mode requires `detection.stream`")?
                    .validate()
                    .map_err(|e| format!("detection.stream: {e}"))?;
            }
        }
        for (name, template) in [
            ("stop", &self.detection.stop),
            ("cleanup", &self.detection.cleanup),
            ("preflight", &self.detection.preflight),
        ] {
            if let Some(t) = template {
                t.validate().map_err(|e| format!("detection.{name}: {e}"))?;
            }
        }
        if let Some(sim) = &self.simulation {
            if sim.repeat && sim.steps.iter().all(|s| s.after_ms == 0) {
                return Err("a repeating simulation needs at least one delayed step".into());
            }
        }
        if self.timing.cleanup_timeout_secs == 0 {
            return Err("cleanup_timeout_secs must be greater than 0".into());
        }
        self.settings()
            .validate()
            .map_err(|e| format!("timing invalid: {e}"))
    }

    /// Orchestrator settings derived from this configuration.
    pub fn settings(&self) -> OrchestratorSettings {
        let t = &self.timing;
        OrchestratorSettings::default()
            .with_settle(Duration::from_millis(t.settle_ms))
            .with_polling(Duration::from_millis(t.poll_interval_ms), t.max_attempts)
            .with_inference_timeout(Duration::from_secs(t.inference_timeout_secs))
            .with_verdict_grace(Duration::from_secs(t.verdict_grace_secs))
            .with_tick_interval(Duration::from_millis(t.tick_interval_ms))
            .with_lock_timeout(t.lock_timeout_ms.map(Duration::from_millis))
            .with_stop_grace(Duration::from_secs(t.stop_grace_secs))
            .with_feed_capacity(self.detection.feed_capacity)
            .with_instance_prefix(self.detection.instance_prefix.clone())
            .with_cooling(self.cooling)
            .with_restart(RestartPolicy {
                max_restarts: self.detection.max_restarts,
            })
    }

    /// Override camera settings from environment lookups.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_CAMERA_ADDRESS) {
            self.camera.address = address;
        }
        if let Some(user) = lookup(ENV_CAMERA_USER) {
            self.camera.user = user;
        }
        if let Some(password) = lookup(ENV_CAMERA_PASSWORD) {
            self.camera.password = password;
        }
    }

    /// Override camera settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a JSON file, apply environment overrides, then validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        let mut cfg: Self = serde_json::from_str(&input).map_err(|e| format!("parse error: {e}"))?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }
}
