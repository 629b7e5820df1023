use std::{fmt, str::FromStr};

use utilities::motor_controller::LimitError;

pub mod driver;
pub mod limit;
pub mod pulse;
pub mod sim;

pub use driver::{DIRECTION_SETUP, MAX_MOVE_DURATION, StepperAxis, TRIGGER_POLL_INTERVAL};
pub use limit::ActiveLowSwitch;
pub use pulse::{MAX_PULSE_FREQUENCY_HZ, PulseGuard, PulseOutput};

/// Physical axes of the machine.
///
/// `Z` carries the build platform, `A` the wiping blade, `B` and `C` are
/// auxiliary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    Z,
    A,
    B,
    C,
}

impl AxisId {
    pub const ALL: [AxisId; 4] = [AxisId::Z, AxisId::A, AxisId::B, AxisId::C];

    pub fn name(&self) -> &'static str {
        match self {
            AxisId::Z => "z",
            AxisId::A => "a",
            AxisId::B => "b",
            AxisId::C => "c",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown axis '{0}'")]
pub struct UnknownAxis(pub String);

impl FromStr for AxisId {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "z" => Ok(AxisId::Z),
            "a" => Ok(AxisId::A),
            "b" => Ok(AxisId::B),
            "c" => Ok(AxisId::C),
            _ => Err(UnknownAxis(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AxisError {
    #[error(
        "invalid configuration for axis {axis}: pulses per revolution {pulses_per_revolution}, lead {lead}"
    )]
    InvalidConfiguration {
        axis: AxisId,
        pulses_per_revolution: f64,
        lead: f64,
    },

    #[error("invalid distance {distance} for axis {axis}")]
    InvalidDistance { axis: AxisId, distance: f64 },

    #[error("move on axis {axis} too long: {steps} steps at {frequency_hz} Hz")]
    MoveTooLong {
        axis: AxisId,
        steps: u64,
        frequency_hz: u32,
    },

    #[error("direction output failed on axis {axis}: {message}")]
    Direction { axis: AxisId, message: String },

    #[error("pulse output failed on axis {axis}: {message}")]
    Pulse { axis: AxisId, message: String },

    #[error("axis {axis}: {source}")]
    Limit {
        axis: AxisId,
        #[source]
        source: LimitError,
    },
}
