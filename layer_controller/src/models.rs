use std::fmt;

use tokio::sync::oneshot;

/// One received protocol line waiting for the controller, with the sink its
/// reply goes to.
#[derive(Debug)]
pub struct CommandEnvelope {
    pub line: String,
    pub response: oneshot::Sender<Reply>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub distance: f64,
    pub speed: f64,
    /// Carried for wire compatibility, has no effect on the motion profile.
    pub accel: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ConfigAxis {
        axis: String,
        pulses_per_revolution: f64,
        lead: f64,
    },
    ConfigZPeel {
        lift: f64,
        ret: f64,
        speed_down: f64,
        speed_up: f64,
    },
    ConfigAWipe {
        fast: f64,
        slow: f64,
    },
    NextLayer,
    MoveRel {
        axis: String,
        request: MoveRequest,
    },
    Unknown,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("{command} is missing argument '{argument}'")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("invalid number '{value}' for '{argument}'")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },

    #[error("{command} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Reply line sent back for exactly one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    AxisConfigured(String),
    PeelConfigured,
    WipeConfigured,
    Done,
    InvalidAxis,
    UnknownCommand,
    Failed(String),
    Busy,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Reply::AxisConfigured(_) | Reply::PeelConfigured | Reply::WipeConfigured | Reply::Done
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::AxisConfigured(axis) => write!(f, "OK: Axis {} configured.", axis),
            Reply::PeelConfigured => f.write_str("OK: Z peel params configured."),
            Reply::WipeConfigured => f.write_str("OK: A wipe params configured."),
            Reply::Done => f.write_str("DONE"),
            Reply::InvalidAxis => f.write_str("ERROR: Invalid axis."),
            Reply::UnknownCommand => f.write_str("ERROR: Unknown command."),
            Reply::Failed(reason) => write!(f, "ERROR: Processing command failed: {}", reason),
            Reply::Busy => f.write_str("ERROR: Controller busy."),
        }
    }
}
