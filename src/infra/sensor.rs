//! Thermal-zone temperature sensor.

use std::path::PathBuf;

use crate::core::{EnvironmentSensor, VerifierError};

/// Default sysfs path of the SoC thermal zone.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Reads a sysfs thermal zone reporting millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZoneSensor {
    path: PathBuf,
}

impl Default for ThermalZoneSensor {
    fn default() -> Self {
        Self::new(DEFAULT_THERMAL_ZONE)
    }
}

impl ThermalZoneSensor {
    /// Sensor reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EnvironmentSensor for ThermalZoneSensor {
    fn read_celsius(&self) -> Result<f32, VerifierError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| VerifierError::Sensor(format!("{}: {e}", self.path.display())))?;
        let millis: f32 = raw
            .trim()
            .parse()
            .map_err(|e| VerifierError::Sensor(format!("bad reading {:?}: {e}", raw.trim())))?;
        Ok(millis / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_millidegrees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        std::fs::write(&path, "45500\n").unwrap();
        let sensor = ThermalZoneSensor::new(&path);
        assert!((sensor.read_celsius().unwrap() - 45.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_file_is_error() {
        let sensor = ThermalZoneSensor::new("/nonexistent/thermal/temp");
        assert!(matches!(sensor.read_celsius(), Err(VerifierError::Sensor(_))));
    }
}
