//! Error types for verification components.

use thiserror::Error;

use crate::util::SlotId;

/// Misuse or contention failures on the shared camera lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The waiter was cancelled before the lock became available.
    #[error("acquisition cancelled for slot {0}")]
    Cancelled(SlotId),
    /// The optional acquisition timeout elapsed.
    #[error("acquisition timed out for slot {0}")]
    Timeout(SlotId),
    /// A lease tried to release a lock it does not hold.
    #[error("slot {slot} released the camera but holder is {holder:?}")]
    NotHolder {
        /// Slot that attempted the release.
        slot: SlotId,
        /// Slot currently recorded as holder, if any.
        holder: Option<SlotId>,
    },
    /// The lock was closed during shutdown.
    #[error("camera lock closed")]
    Closed,
}

/// Failures of the external detection backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend process could not be started.
    #[error("backend spawn failed: {0}")]
    Spawn(String),
    /// The backend exited unsuccessfully.
    #[error("backend crashed: {0}")]
    Crashed(String),
    /// The backend did not finish within the hard timeout.
    #[error("backend timed out after {0}s")]
    Timeout(u64),
    /// Preflight checks failed before the backend could serve jobs.
    #[error("backend preflight failed: {0}")]
    Preflight(String),
}

/// Errors produced by verification components.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// Camera lock failure.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Camera reposition failed (timeout, auth rejection, refused connection).
    #[error("reposition failed: {0}")]
    RepositionFailed(String),
    /// Frame capture failed.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    /// Detection backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A queue endpoint was closed.
    #[error("queue closed: {0}")]
    QueueClosed(String),
    /// The inference worker could not be started; fatal for the orchestrator.
    #[error("inference worker failed to start: {0}")]
    InferenceStart(String),
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Environment sensor could not be read.
    #[error("sensor read failed: {0}")]
    Sensor(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
