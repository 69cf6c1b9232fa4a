//! Cooling and backend restart policies.

use serde::{Deserialize, Serialize};

/// Temperature thresholds mapped to a cooling level.
///
/// Below `t1` cooling is off, `[t1, t2)` runs at `low`, and `t2` or above
/// runs at `high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolingPolicy {
    /// Lower threshold in degrees Celsius.
    pub t1: f32,
    /// Upper threshold in degrees Celsius.
    pub t2: f32,
    /// Level applied between the thresholds.
    pub low: u8,
    /// Level applied at or above the upper threshold.
    pub high: u8,
}

impl Default for CoolingPolicy {
    fn default() -> Self {
        Self {
            t1: 40.0,
            t2: 50.0,
            low: 40,
            high: 100,
        }
    }
}

impl CoolingPolicy {
    /// Cooling level for `celsius`.
    pub fn level(&self, celsius: f32) -> u8 {
        if celsius >= self.t2 {
            self.high
        } else if celsius >= self.t1 {
            self.low
        } else {
            0
        }
    }

    /// Validate thresholds and levels.
    pub fn validate(&self) -> Result<(), String> {
        if !self.t1.is_finite() || !self.t2.is_finite() {
            return Err("cooling thresholds must be finite".into());
        }
        if self.t1 >= self.t2 {
            return Err("cooling t1 must be below t2".into());
        }
        if self.low > self.high {
            return Err("cooling low level must not exceed high level".into());
        }
        if self.high > 100 {
            return Err("cooling high level must be at most 100".into());
        }
        Ok(())
    }
}

/// How often a streaming backend may be restarted after it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Restarts allowed over the orchestrator's lifetime. 0 disables restarts.
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { max_restarts: 3 }
    }
}

impl RestartPolicy {
    /// Never restart.
    pub fn never() -> Self {
        Self { max_restarts: 0 }
    }

    /// Whether another restart is allowed after `restarts` already happened.
    pub fn allows(&self, restarts: u32) -> bool {
        restarts < self.max_restarts
    }
}
