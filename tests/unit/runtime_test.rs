//! Tests for status snapshots and health

use slotwatch::builders::build_orchestrator;
use slotwatch::config::VerifierConfig;
use slotwatch::core::{ActuatorCommand, OccupancyMap};
use slotwatch::runtime::{health, snapshot};
use slotwatch::util::SlotState;

const CONFIG: &str = r#"{
    "camera": { "address": "10.0.0.64" },
    "slots": [ { "preset": 1 }, { "preset": 2 } ],
    "detection": { "detect": ["yolo", "predict", "source={source}"] }
}"#;

#[test]
fn test_snapshot_before_start() {
    let cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    let occupancy = OccupancyMap::new();
    let orchestrator = build_orchestrator(&cfg, occupancy.clone()).unwrap();
    occupancy.set(1, true);

    let status = snapshot(&orchestrator);
    assert_eq!(status.slots.len(), 2);
    assert_eq!(status.slots[0].state, SlotState::Vacant);
    assert_eq!(status.slots[1].state, SlotState::Pending);
    assert!(!status.slots[1].worker_active);
    assert_eq!(status.camera_holder, None);
    assert_eq!(status.command, ActuatorCommand::default());
    assert!(status.verified_slots().is_empty());
}

#[test]
fn test_health_requires_running_backend() {
    let cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    let orchestrator = build_orchestrator(&cfg, OccupancyMap::new()).unwrap();

    let report = health(&snapshot(&orchestrator));
    assert!(!report.ok);
    assert!(report.reason.unwrap().contains("not running"));
}

#[test]
fn test_snapshot_serializes() {
    let cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    let orchestrator = build_orchestrator(&cfg, OccupancyMap::new()).unwrap();

    let json = serde_json::to_value(snapshot(&orchestrator)).unwrap();
    assert_eq!(json["slots"][0]["state"], "vacant");
    assert_eq!(json["command"]["cooling_level"], 0);
}
