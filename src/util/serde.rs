//! Shared identifiers and serializable state types.

use serde::{Deserialize, Serialize};

/// Identifier of a monitored parking slot.
pub type SlotId = u32;

/// Camera preset number the PTZ head moves to for a slot.
pub type PresetId = u32;

/// Verification state of a slot as seen by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// No vehicle reported.
    Vacant,
    /// Occupied, verification still running.
    Pending,
    /// Occupied and confirmed by the detector.
    Verified,
    /// Occupied but the last verification failed.
    Unverified,
}

impl SlotState {
    /// Stable string form for logs and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacant => "vacant",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Unverified => "unverified",
        }
    }
}
