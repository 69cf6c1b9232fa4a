//! Builders to construct an orchestrator from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DetectionMode, VerifierConfig};
use crate::core::{
    Actuator, CameraControl, DetectionEngine, DetectionMatcher, EnvironmentSensor, OccupancyMap,
    Orchestrator, SlotRegistry, VerifierError,
};
use crate::infra::{FfmpegFrameSource, IsapiCamera, LogActuator, ProcessBackend, ThermalZoneSensor};

/// Build the slot registry described by `cfg`, reading `occupancy`.
///
/// Slots with an explicit id keep it; the others get sequential ids.
pub fn build_registry(cfg: &VerifierConfig, occupancy: OccupancyMap) -> SlotRegistry {
    let mut registry = SlotRegistry::new(occupancy);
    for slot in cfg.slots.iter().filter(|s| s.id.is_some()) {
        if let Some(id) = slot.id {
            registry.insert_slot_with_id(id, slot.preset);
        }
    }
    for slot in cfg.slots.iter().filter(|s| s.id.is_none()) {
        registry.insert_slot(slot.preset);
    }
    registry
}

/// Build the process backend described by `cfg`.
pub fn build_backend(cfg: &VerifierConfig) -> ProcessBackend {
    let detection = &cfg.detection;
    let mut backend = ProcessBackend::new()
        .with_stop(detection.stop.clone())
        .with_cleanup(detection.cleanup.clone())
        .with_preflight(detection.preflight.clone())
        .with_cleanup_timeout(Duration::from_secs(cfg.timing.cleanup_timeout_secs));
    if let Some(detect) = &detection.detect {
        backend = backend.with_detect(detect.clone());
    }
    if let Some(stream) = &detection.stream {
        backend = backend.with_stream(stream.clone());
    }
    backend
}

/// Build an orchestrator from configuration and explicit collaborators.
pub fn build_orchestrator_with(
    cfg: &VerifierConfig,
    occupancy: OccupancyMap,
    camera: Arc<dyn CameraControl>,
    engine: DetectionEngine,
    sensor: Arc<dyn EnvironmentSensor>,
    actuator: Arc<dyn Actuator>,
) -> Result<Orchestrator, VerifierError> {
    cfg.validate()
        .map_err(|e| VerifierError::Config(format!("config invalid: {e}")))?;
    let matcher = DetectionMatcher::new(&cfg.detection.labels)?;
    Ok(Orchestrator::new(
        build_registry(cfg, occupancy),
        camera,
        engine,
        sensor,
        actuator,
        matcher,
        cfg.settings(),
    ))
}

/// Build an orchestrator wired to the ISAPI camera, ffmpeg capture, the
/// process backend, the thermal-zone sensor and the logging actuator.
pub fn build_orchestrator(
    cfg: &VerifierConfig,
    occupancy: OccupancyMap,
) -> Result<Orchestrator, VerifierError> {
    let camera = IsapiCamera::new(
        &cfg.camera.address,
        cfg.camera.user.clone(),
        cfg.camera.password.clone(),
        Duration::from_secs(cfg.camera.request_timeout_secs),
    )?
    .with_channel(cfg.camera.ptz_channel);
    let backend = Arc::new(build_backend(cfg));
    let engine = match cfg.detection.mode {
        DetectionMode::SingleShot => {
            let rtsp = FfmpegFrameSource::rtsp_url(
                &cfg.camera.address,
                &cfg.camera.user,
                &cfg.camera.password,
                &cfg.camera.rtsp_stream,
            );
            DetectionEngine::SingleShot {
                backend,
                frames: Arc::new(FfmpegFrameSource::new(
                    rtsp,
                    cfg.capture_dir.clone(),
                    Duration::from_secs(cfg.camera.capture_timeout_secs),
                )),
            }
        }
        DetectionMode::Streaming => DetectionEngine::Streaming {
            backend,
            policy: cfg.detection.feed_policy,
        },
    };
    build_orchestrator_with(
        cfg,
        occupancy,
        Arc::new(camera),
        engine,
        Arc::new(ThermalZoneSensor::new(cfg.thermal_zone.clone())),
        Arc::new(LogActuator::new()),
    )
}
