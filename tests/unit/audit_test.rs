//! Tests for audit sink

use slotwatch::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let detail = Some("verified after 1 attempt(s)".to_string());
    let event = build_audit_event(Some(1), AuditAction::Verdict, detail);
    sink.record(event.clone());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].slot_id, Some(1));
    assert_eq!(events[0].action, AuditAction::Verdict);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(Some(0), AuditAction::Spawn, None));
    sink.record(build_audit_event(Some(0), AuditAction::Cancel, None));
    sink.record(build_audit_event(None, AuditAction::BackendRestart, None));

    let actions: Vec<_> = sink.events().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Cancel, AuditAction::BackendRestart]);
}

#[test]
fn test_audit_event_ids_are_unique() {
    let a = build_audit_event(Some(0), AuditAction::Spawn, None);
    let b = build_audit_event(Some(0), AuditAction::Spawn, None);
    assert_ne!(a.event_id, b.event_id);
    assert!(a.created_at_ms > 0);
}

#[test]
fn test_audit_action_serializes_snake_case() {
    let json = serde_json::to_string(&AuditAction::BackendRestart).unwrap();
    assert_eq!(json, "\"backend_restart\"");
}
