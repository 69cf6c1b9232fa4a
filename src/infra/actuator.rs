//! Actuator that reports target changes through tracing.

use parking_lot::Mutex;

use crate::core::{Actuator, ActuatorCommand};

/// Logs each change of cooling level or alert state.
///
/// Stands in for fan PWM and alert light drivers on hosts without GPIO.
#[derive(Debug, Default)]
pub struct LogActuator {
    last: Mutex<Option<ActuatorCommand>>,
}

impl LogActuator {
    /// Create an actuator with no command applied yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied command.
    pub fn current(&self) -> Option<ActuatorCommand> {
        *self.last.lock()
    }
}

impl Actuator for LogActuator {
    fn apply(&self, command: ActuatorCommand) {
        let previous = self.last.lock().replace(command);
        if previous == Some(command) {
            return;
        }
        if previous.map(|p| p.alert) != Some(command.alert) {
            let state = if command.alert { "on" } else { "off" };
            tracing::info!(alert = command.alert, "alert indicator {state}");
        }
        if previous.map(|p| p.cooling_level) != Some(command.cooling_level) {
            tracing::info!(cooling_level = command.cooling_level, "cooling level set");
        }
    }
}
