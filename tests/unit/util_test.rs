//! Tests for utility functions

use slotwatch::util::{now_ms, SlotState};

#[test]
fn test_slot_state_strings() {
    assert_eq!(SlotState::Vacant.as_str(), "vacant");
    assert_eq!(SlotState::Pending.as_str(), "pending");
    assert_eq!(SlotState::Verified.as_str(), "verified");
    assert_eq!(SlotState::Unverified.as_str(), "unverified");
}

#[test]
fn test_slot_state_serde_matches_as_str() {
    for state in [
        SlotState::Vacant,
        SlotState::Pending,
        SlotState::Verified,
        SlotState::Unverified,
    ] {
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, format!("\"{}\"", state.as_str()));
    }
}

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}
