//! Status and health models exposed by the daemon.

use serde::{Deserialize, Serialize};

use crate::core::{ActuatorCommand, Orchestrator, SlotStatus};
use crate::util::{now_ms, SlotId, SlotState};

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Every registered slot, ordered by id.
    pub slots: Vec<SlotStatus>,
    /// Slot holding the camera, if any.
    pub camera_holder: Option<SlotId>,
    /// Last actuator command.
    pub command: ActuatorCommand,
    /// Last temperature sample in degrees Celsius.
    pub temperature_celsius: f32,
    /// Whether the inference worker is running.
    pub backend_running: bool,
    /// Streaming backend restarts so far.
    pub backend_restarts: u32,
    /// Snapshot time (ms since epoch).
    pub generated_at_ms: u128,
}

impl StatusSnapshot {
    /// Slots currently confirmed by the detector.
    pub fn verified_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Verified)
            .map(|s| s.id)
            .collect()
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Reason when unhealthy.
    pub reason: Option<String>,
}

/// Capture the orchestrator's current status.
pub fn snapshot(orchestrator: &Orchestrator) -> StatusSnapshot {
    StatusSnapshot {
        slots: orchestrator.slot_statuses(),
        camera_holder: orchestrator.camera_holder(),
        command: orchestrator.last_command(),
        temperature_celsius: orchestrator.last_temperature(),
        backend_running: orchestrator.backend_running(),
        backend_restarts: orchestrator.backend_restarts(),
        generated_at_ms: now_ms(),
    }
}

/// Health derived from a snapshot: unhealthy once the inference worker is down.
pub fn health(status: &StatusSnapshot) -> Health {
    if status.backend_running {
        Health { ok: true, reason: None }
    } else {
        Health {
            ok: false,
            reason: Some(format!(
                "inference backend not running after {} restart(s)",
                status.backend_restarts
            )),
        }
    }
}
