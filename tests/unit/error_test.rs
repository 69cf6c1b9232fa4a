//! Tests for error types

use slotwatch::core::{BackendError, LockError, VerifierError};

#[test]
fn test_lock_error_messages() {
    assert_eq!(LockError::Cancelled(3).to_string(), "acquisition cancelled for slot 3");
    assert_eq!(LockError::Timeout(1).to_string(), "acquisition timed out for slot 1");
    assert_eq!(LockError::Closed.to_string(), "camera lock closed");
}

#[test]
fn test_not_holder_names_both_slots() {
    let err = LockError::NotHolder {
        slot: 2,
        holder: Some(5),
    };
    assert_eq!(err.to_string(), "slot 2 released the camera but holder is Some(5)");
}

#[test]
fn test_backend_error_converts_transparently() {
    let err: VerifierError = BackendError::Timeout(30).into();
    assert!(matches!(err, VerifierError::Backend(BackendError::Timeout(30))));
    assert_eq!(err.to_string(), "backend timed out after 30s");
}

#[test]
fn test_lock_error_converts_transparently() {
    let err: VerifierError = LockError::Closed.into();
    assert_eq!(err.to_string(), "camera lock closed");
}

#[test]
fn test_verifier_error_messages() {
    assert_eq!(
        VerifierError::RepositionFailed("timeout".into()).to_string(),
        "reposition failed: timeout"
    );
    assert_eq!(
        VerifierError::InferenceStart("no such image".into()).to_string(),
        "inference worker failed to start: no such image"
    );
}

#[test]
fn test_app_result_wraps_verifier_error() {
    fn load() -> slotwatch::core::AppResult<()> {
        Err(VerifierError::Config("slots missing".into()).into())
    }
    let err = load().unwrap_err();
    assert!(err.downcast_ref::<VerifierError>().is_some());
}
