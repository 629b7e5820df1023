//! Step pulse generation.

use std::fmt;

/// Ceiling of the step input on the drivers in use.
pub const MAX_PULSE_FREQUENCY_HZ: f64 = 40_000.0;

/// A hardware pulse generator (typically a PWM channel at 50% duty) wired to
/// a driver's STEP input.
pub trait PulseOutput: Send {
    type Error: fmt::Debug;

    /// Starts a constant-frequency square wave.
    fn start(&mut self, frequency_hz: u32) -> Result<(), Self::Error>;

    /// Stops the wave and pulls the line low. Must succeed from any state.
    fn idle(&mut self);
}

/// Keeps a pulse train running for as long as it is alive.
///
/// The output is idled when the guard drops, which covers early returns,
/// errors and cancelled futures alike.
pub struct PulseGuard<'a, P: PulseOutput> {
    output: &'a mut P,
}

impl<'a, P: PulseOutput> PulseGuard<'a, P> {
    pub fn start(output: &'a mut P, frequency_hz: u32) -> Result<Self, P::Error> {
        // The guard exists before the output is touched, so a failing start
        // still ends idle.
        let guard = PulseGuard { output };
        guard.output.start(frequency_hz)?;
        Ok(guard)
    }
}

impl<P: PulseOutput> Drop for PulseGuard<'_, P> {
    fn drop(&mut self) {
        self.output.idle();
    }
}

/// Pulse frequency for `speed` (units/s), clamped to the driver ceiling.
pub fn pulse_frequency(speed: f64, steps_per_unit: f64) -> f64 {
    (speed * steps_per_unit).min(MAX_PULSE_FREQUENCY_HZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        active: bool,
        starts: Vec<u32>,
        idles: usize,
        fail: bool,
    }

    impl PulseOutput for Recorder {
        type Error = &'static str;

        fn start(&mut self, frequency_hz: u32) -> Result<(), Self::Error> {
            self.active = true;
            self.starts.push(frequency_hz);
            if self.fail { Err("stalled") } else { Ok(()) }
        }

        fn idle(&mut self) {
            self.active = false;
            self.idles += 1;
        }
    }

    #[test]
    fn guard_idles_on_drop() {
        let mut output = Recorder::default();
        {
            let _guard = PulseGuard::start(&mut output, 1_000).unwrap();
        }
        assert!(!output.active);
        assert_eq!(output.starts, [1_000]);
        assert_eq!(output.idles, 1);
    }

    #[test]
    fn failed_start_still_idles() {
        let mut output = Recorder {
            fail: true,
            ..Default::default()
        };
        assert!(PulseGuard::start(&mut output, 500).is_err());
        assert!(!output.active);
        assert_eq!(output.idles, 1);
    }

    #[test]
    fn frequency_is_clamped_to_driver_ceiling() {
        assert_eq!(pulse_frequency(10.0, 100.0), 1_000.0);
        assert_eq!(pulse_frequency(20.0, 2_560.0), MAX_PULSE_FREQUENCY_HZ);
        assert_eq!(pulse_frequency(1.0e9, 1.0e9), MAX_PULSE_FREQUENCY_HZ);
    }
}
