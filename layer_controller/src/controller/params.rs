use std::time::Duration;

use serde::{Deserialize, Serialize};
use utilities::motor_controller::DEFAULT_TRIGGER_TIMEOUT;

/// Process-wide layer change parameters. Distances in mm, speeds in mm/s.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerParameters {
    pub peel_lift_distance: f64,
    pub peel_return_distance: f64,
    pub z_speed_down: f64,
    pub z_speed_up: f64,
    pub wipe_speed_fast: f64,
    pub wipe_speed_slow: f64,
}

impl Default for LayerParameters {
    fn default() -> Self {
        Self {
            peel_lift_distance: 5.05,
            peel_return_distance: 5.0,
            z_speed_down: 20.0,
            z_speed_up: 20.0,
            wipe_speed_fast: 80.0,
            wipe_speed_slow: 10.0,
        }
    }
}

impl LayerParameters {
    pub fn set_peel(&mut self, lift: f64, ret: f64, speed_down: f64, speed_up: f64) {
        self.peel_lift_distance = lift;
        self.peel_return_distance = ret;
        self.z_speed_down = speed_down;
        self.z_speed_up = speed_up;
    }

    pub fn set_wipe(&mut self, fast: f64, slow: f64) {
        self.wipe_speed_fast = fast;
        self.wipe_speed_slow = slow;
    }

    pub fn validate(&self) -> Result<(), String> {
        let distances = [
            ("peel_lift_distance", self.peel_lift_distance),
            ("peel_return_distance", self.peel_return_distance),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite, non-negative distance", name));
            }
        }

        let speeds = [
            ("z_speed_down", self.z_speed_down),
            ("z_speed_up", self.z_speed_up),
            ("wipe_speed_fast", self.wipe_speed_fast),
            ("wipe_speed_slow", self.wipe_speed_slow),
        ];
        for (name, value) in speeds {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be a positive speed", name));
            }
        }

        Ok(())
    }
}

/// Fixed timing of the layer change choreography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceTiming {
    pub return_settle: Duration,
    pub wipe_settle: Duration,
    pub peel_settle: Duration,
    pub trigger_timeout: Duration,
    /// Travel away from a limit switch once it has closed.
    pub back_off_distance: f64,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            return_settle: Duration::from_millis(100),
            wipe_settle: Duration::from_millis(100),
            peel_settle: Duration::from_millis(1000),
            trigger_timeout: DEFAULT_TRIGGER_TIMEOUT,
            back_off_distance: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(LayerParameters::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_non_positive_speeds() {
        let mut params = LayerParameters::default();
        params.set_wipe(80.0, 0.0);
        assert!(params.validate().unwrap_err().contains("wipe_speed_slow"));

        let mut params = LayerParameters::default();
        params.set_peel(f64::NAN, 5.0, 20.0, 20.0);
        assert!(params.validate().unwrap_err().contains("peel_lift_distance"));
    }
}
