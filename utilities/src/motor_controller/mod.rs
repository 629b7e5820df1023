use std::{fmt, time::Duration};

/// Window a triggered move waits for its limit switch before giving up.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Why a move returned without emitting a single pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    NonPositiveSpeed,
    ZeroSteps,
    ZeroFrequency,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NotConfigured => "steps per unit not configured",
            SkipReason::NonPositiveSpeed => "speed is not positive",
            SkipReason::ZeroSteps => "distance rounds to zero steps",
            SkipReason::ZeroFrequency => "pulse frequency rounds to zero",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    Completed { steps: u64, frequency_hz: u32 },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerOutcome {
    Triggered { elapsed: Duration },
    TimedOut,
    Skipped(SkipReason),
}

impl TriggerOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, TriggerOutcome::Triggered { .. })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("limit switch read failed: {0}")]
pub struct LimitError(pub String);

/// A digital end-of-travel input.
pub trait LimitSwitch: Send {
    fn is_triggered(&mut self) -> Result<bool, LimitError>;
}

/// Open-loop stepper axis: every motion is a timed pulse train, nothing is
/// measured back.
///
/// Implementations are driven through `&mut self` and are not meant to be
/// shared; one caller issues one operation at a time and awaits it to
/// completion.
#[async_trait::async_trait]
pub trait Motor: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    fn configure(&mut self, pulses_per_revolution: f64, lead: f64) -> Result<(), Self::Error>;
    fn steps_per_unit(&self) -> f64;

    async fn move_relative(&mut self, distance: f64, speed: f64)
    -> Result<MoveOutcome, Self::Error>;

    async fn move_until_trigger(
        &mut self,
        forward: bool,
        speed: f64,
        switch: &mut dyn LimitSwitch,
        timeout: Duration,
    ) -> Result<TriggerOutcome, Self::Error>;
}
