//! Tests for configuration validation

use std::time::Duration;

use slotwatch::config::verifier::{ENV_CAMERA_ADDRESS, ENV_CAMERA_PASSWORD};
use slotwatch::config::{DetectionMode, VerifierConfig};
use slotwatch::infra::FeedPolicy;

const SINGLE_SHOT: &str = r#"{
    "camera": { "address": "10.0.0.64", "user": "admin" },
    "slots": [ { "preset": 1 }, { "preset": 2 } ],
    "detection": {
        "detect": ["yolo", "predict", "source={source}"],
        "cleanup": ["docker", "rm", "-f", "{instance}"]
    }
}"#;

const STREAMING: &str = r#"{
    "camera": { "address": "10.0.0.64" },
    "slots": [ { "id": 7, "preset": 3 } ],
    "timing": { "poll_interval_ms": 500, "max_attempts": 5 },
    "detection": {
        "mode": "streaming",
        "stream": ["yolo", "predict", "source=rtsp://cam/101", "stream=True"],
        "feed_policy": "shared",
        "max_restarts": 1
    }
}"#;

fn single_shot() -> VerifierConfig {
    VerifierConfig::from_json_str(SINGLE_SHOT).unwrap()
}

#[test]
fn test_single_shot_defaults() {
    let cfg = single_shot();
    assert_eq!(cfg.detection.mode, DetectionMode::SingleShot);
    assert_eq!(cfg.detection.labels, vec!["car".to_string(), "carro".to_string()]);
    assert_eq!(cfg.camera.rtsp_stream, "Streaming/Channels/101");
    assert_eq!(cfg.camera.ptz_channel, 1);

    let settings = cfg.settings();
    assert_eq!(settings.settle, Duration::from_secs(10));
    assert_eq!(settings.poll_interval, Duration::from_secs(2));
    assert_eq!(settings.max_attempts, 3);
    assert_eq!(settings.inference_timeout, Duration::from_secs(30));
    assert_eq!(settings.lock_timeout, None);
}

#[test]
fn test_streaming_config() {
    let cfg = VerifierConfig::from_json_str(STREAMING).unwrap();
    assert_eq!(cfg.detection.mode, DetectionMode::Streaming);
    assert_eq!(cfg.detection.feed_policy, FeedPolicy::Shared);

    let settings = cfg.settings();
    assert_eq!(settings.poll_interval, Duration::from_millis(500));
    assert_eq!(settings.max_attempts, 5);
    assert_eq!(settings.restart.max_restarts, 1);
}

#[test]
fn test_rejects_missing_slots() {
    let mut cfg = single_shot();
    cfg.slots.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_rejects_duplicate_slot_ids() {
    let mut cfg = single_shot();
    cfg.slots[0].id = Some(4);
    cfg.slots[1].id = Some(4);
    assert!(cfg.validate().unwrap_err().contains("unique"));
}

#[test]
fn test_rejects_detect_without_source() {
    let input = SINGLE_SHOT.replace("source={source}", "source=/tmp/x.jpg");
    let err = VerifierConfig::from_json_str(&input).unwrap_err();
    assert!(err.contains("{source}"));
}

#[test]
fn test_rejects_zero_ptz_channel() {
    let input = SINGLE_SHOT.replace(
        "\"user\": \"admin\"",
        "\"user\": \"admin\", \"ptz_channel\": 0",
    );
    let err = VerifierConfig::from_json_str(&input).unwrap_err();
    assert!(err.contains("ptz_channel"));
}

#[test]
fn test_rejects_blank_detection_label() {
    let input = SINGLE_SHOT.replace(
        "\"detection\": {",
        "\"detection\": { \"labels\": [\"car\", \"\"],",
    );
    let err = VerifierConfig::from_json_str(&input).unwrap_err();
    assert!(err.contains("blank"));

    let input = SINGLE_SHOT.replace("\"detection\": {", "\"detection\": { \"labels\": [],");
    assert!(VerifierConfig::from_json_str(&input).is_err());
}

#[test]
fn test_streaming_requires_stream_command() {
    let input = STREAMING.replace("\"stream\":", "\"unused\":");
    assert!(VerifierConfig::from_json_str(&input).is_err());
}

#[test]
fn test_rejects_zero_timing() {
    let mut cfg = single_shot();
    cfg.timing.max_attempts = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = single_shot();
    cfg.timing.tick_interval_ms = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = single_shot();
    cfg.timing.cleanup_timeout_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_rejects_inverted_cooling_thresholds() {
    let mut cfg = single_shot();
    cfg.cooling.t1 = 60.0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_rejects_busy_loop_simulation() {
    let simulation = concat!(
        "\"simulation\": { \"repeat\": true, \"steps\": [ ",
        "{ \"after_ms\": 0, \"slot\": 0, \"occupied\": true } ] }, \"slots\"",
    );
    let input = SINGLE_SHOT.replace("\"slots\"", simulation);
    assert!(VerifierConfig::from_json_str(&input).is_err());
}

#[test]
fn test_env_overrides_camera() {
    let mut cfg = single_shot();
    cfg.apply_env_with(|key| match key {
        k if k == ENV_CAMERA_ADDRESS => Some("10.0.0.99:8080".into()),
        k if k == ENV_CAMERA_PASSWORD => Some("hunter2".into()),
        _ => None,
    });
    assert_eq!(cfg.camera.address, "10.0.0.99:8080");
    assert_eq!(cfg.camera.user, "admin");
    assert_eq!(cfg.camera.password, "hunter2");
}

#[test]
fn test_password_is_never_serialized() {
    let mut cfg = single_shot();
    cfg.camera.password = "hunter2".into();
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(!json.contains("hunter2"));
}

#[test]
fn test_from_file_reads_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slotwatch.json");
    std::fs::write(&path, STREAMING).unwrap();

    let cfg = VerifierConfig::from_file(&path).unwrap();
    assert_eq!(cfg.slots[0].id, Some(7));
}

#[test]
fn test_from_file_reports_missing_file() {
    let err = VerifierConfig::from_file("/nonexistent/slotwatch.json").unwrap_err();
    assert!(err.contains("/nonexistent/slotwatch.json"));
}
