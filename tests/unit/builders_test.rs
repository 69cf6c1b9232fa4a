//! Tests for orchestrator builders

use slotwatch::builders::{build_orchestrator, build_registry};
use slotwatch::config::VerifierConfig;
use slotwatch::core::{OccupancyMap, VerifierError};

const CONFIG: &str = r#"{
    "camera": { "address": "10.0.0.64" },
    "slots": [ { "preset": 1 }, { "id": 5, "preset": 9 }, { "preset": 2 } ],
    "detection": { "detect": ["yolo", "predict", "source={source}"] }
}"#;

#[test]
fn test_registry_keeps_explicit_ids() {
    let cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    let registry = build_registry(&cfg, OccupancyMap::new());

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.preset(5), Some(9));
    // Sequential ids continue after the highest explicit id.
    assert_eq!(registry.preset(6), Some(1));
    assert_eq!(registry.preset(7), Some(2));
}

#[test]
fn test_build_orchestrator_from_config() {
    let cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    let occupancy = OccupancyMap::new();
    let orchestrator = build_orchestrator(&cfg, occupancy.clone()).unwrap();

    assert_eq!(orchestrator.registry().len(), 3);
    assert!(orchestrator.active_slots().is_empty());
    assert!(!orchestrator.is_stopped());

    occupancy.set(5, true);
    assert!(orchestrator.registry().occupancy().get(5));
}

#[test]
fn test_build_orchestrator_rejects_invalid_config() {
    let mut cfg = VerifierConfig::from_json_str(CONFIG).unwrap();
    cfg.detection.labels.clear();
    assert!(matches!(
        build_orchestrator(&cfg, OccupancyMap::new()),
        Err(VerifierError::Config(_))
    ));
}
