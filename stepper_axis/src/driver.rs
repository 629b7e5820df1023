//! Open-loop stepper axis driver.
//!
//! Every motion goes through the same phases: the direction line is latched,
//! the driver gets [`DIRECTION_SETUP`] to see it, then a constant-frequency
//! pulse train runs either for a computed duration or until a limit switch
//! closes. The pulse output is back to idle whenever an operation returns.

use std::time::Duration;

use embedded_hal::digital::OutputPin;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use utilities::motor_controller::{LimitSwitch, Motor, MoveOutcome, SkipReason, TriggerOutcome};

use crate::{
    AxisError, AxisId,
    pulse::{PulseGuard, PulseOutput, pulse_frequency},
};

/// Time the direction line is held stable before the first step edge.
pub const DIRECTION_SETUP: Duration = Duration::from_millis(50);

/// How often the limit switch is sampled during a triggered move.
pub const TRIGGER_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest pulse train a relative move may run. Longer moves are refused
/// before any pin is touched.
pub const MAX_MOVE_DURATION: Duration = Duration::from_secs(3600);

/// One stepper axis: a pulse output on STEP and a digital output on DIR.
///
/// DIR high means reverse travel. `steps_per_unit` starts at zero, so the
/// axis refuses to move until [`Motor::configure`] has been called.
///
/// Not safe for concurrent use. All operations take `&mut self` and must be
/// awaited to completion by a single caller.
pub struct StepperAxis<P, D> {
    id: AxisId,
    pulse: P,
    dir: D,
    steps_per_unit: f64,
}

impl<P, D> StepperAxis<P, D>
where
    P: PulseOutput,
    D: OutputPin + Send,
{
    pub fn new(id: AxisId, mut pulse: P, dir: D) -> Self {
        pulse.idle();

        Self {
            id,
            pulse,
            dir,
            steps_per_unit: 0.0,
        }
    }

    pub fn id(&self) -> AxisId {
        self.id
    }

    fn check_ready(&self, speed: f64) -> Option<SkipReason> {
        if !(self.steps_per_unit > 0.0) {
            Some(SkipReason::NotConfigured)
        } else if !(speed > 0.0) {
            Some(SkipReason::NonPositiveSpeed)
        } else if (pulse_frequency(speed, self.steps_per_unit) as u32) == 0 {
            Some(SkipReason::ZeroFrequency)
        } else {
            None
        }
    }

    fn set_direction(&mut self, reverse: bool) -> Result<(), AxisError> {
        let result = if reverse {
            self.dir.set_high()
        } else {
            self.dir.set_low()
        };

        result.map_err(|e| AxisError::Direction {
            axis: self.id,
            message: format!("{:?}", e),
        })
    }

    fn start_pulses(&mut self, frequency_hz: u32) -> Result<PulseGuard<'_, P>, AxisError> {
        let axis = self.id;
        PulseGuard::start(&mut self.pulse, frequency_hz).map_err(|e| AxisError::Pulse {
            axis,
            message: format!("{:?}", e),
        })
    }

    fn skip(&self, reason: SkipReason) -> SkipReason {
        warn!("Axis {} move skipped: {}", self.id, reason);
        reason
    }
}

#[async_trait::async_trait]
impl<P, D> Motor for StepperAxis<P, D>
where
    P: PulseOutput,
    D: OutputPin + Send,
{
    type Error = AxisError;

    fn configure(&mut self, pulses_per_revolution: f64, lead: f64) -> Result<(), AxisError> {
        let valid = pulses_per_revolution.is_finite()
            && lead.is_finite()
            && pulses_per_revolution > 0.0
            && lead > 0.0;

        if !valid {
            return Err(AxisError::InvalidConfiguration {
                axis: self.id,
                pulses_per_revolution,
                lead,
            });
        }

        self.steps_per_unit = pulses_per_revolution / lead;
        info!(
            "Axis {} configured: {:.4} steps per unit",
            self.id, self.steps_per_unit
        );
        Ok(())
    }

    fn steps_per_unit(&self) -> f64 {
        self.steps_per_unit
    }

    async fn move_relative(&mut self, distance: f64, speed: f64) -> Result<MoveOutcome, AxisError> {
        if let Some(reason) = self.check_ready(speed) {
            return Ok(MoveOutcome::Skipped(self.skip(reason)));
        }

        if !distance.is_finite() {
            return Err(AxisError::InvalidDistance {
                axis: self.id,
                distance,
            });
        }

        let steps = (distance.abs() * self.steps_per_unit) as u64;
        if steps == 0 {
            return Ok(MoveOutcome::Skipped(self.skip(SkipReason::ZeroSteps)));
        }

        let frequency = pulse_frequency(speed, self.steps_per_unit);
        let frequency_hz = frequency as u32;
        let duration = Duration::try_from_secs_f64(steps as f64 / frequency)
            .ok()
            .filter(|duration| *duration <= MAX_MOVE_DURATION)
            .ok_or(AxisError::MoveTooLong {
                axis: self.id,
                steps,
                frequency_hz,
            })?;

        self.set_direction(distance < 0.0)?;
        sleep(DIRECTION_SETUP).await;

        debug!(
            "Axis {} moving {} steps at {} Hz for {:?}",
            self.id, steps, frequency_hz, duration
        );
        {
            let _pulses = self.start_pulses(frequency_hz)?;
            sleep(duration).await;
        }

        Ok(MoveOutcome::Completed {
            steps,
            frequency_hz,
        })
    }

    async fn move_until_trigger(
        &mut self,
        forward: bool,
        speed: f64,
        switch: &mut dyn LimitSwitch,
        timeout: Duration,
    ) -> Result<TriggerOutcome, AxisError> {
        if let Some(reason) = self.check_ready(speed) {
            return Ok(TriggerOutcome::Skipped(self.skip(reason)));
        }

        let frequency_hz = pulse_frequency(speed, self.steps_per_unit) as u32;

        self.set_direction(!forward)?;
        sleep(DIRECTION_SETUP).await;

        let axis = self.id;
        debug!(
            "Axis {} seeking limit ({}) at {} Hz",
            axis,
            if forward { "forward" } else { "reverse" },
            frequency_hz
        );

        let _pulses = self.start_pulses(frequency_hz)?;
        let started = Instant::now();

        while started.elapsed() < timeout {
            let triggered = switch
                .is_triggered()
                .map_err(|source| AxisError::Limit { axis, source })?;

            if triggered {
                let elapsed = started.elapsed();
                info!("Axis {} reached limit after {:?}", axis, elapsed);
                return Ok(TriggerOutcome::Triggered { elapsed });
            }

            sleep(TRIGGER_POLL_INTERVAL).await;
        }

        warn!(
            "Axis {} timed out waiting for limit after {} ms",
            axis,
            timeout.as_millis()
        );
        Ok(TriggerOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
    use utilities::motor_controller::DEFAULT_TRIGGER_TIMEOUT;

    use super::*;
    use crate::{
        pulse::MAX_PULSE_FREQUENCY_HZ,
        sim::{RigEvent, SimRig},
    };

    #[tokio::test(start_paused = true)]
    async fn unconfigured_axis_is_a_true_no_op() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::Z);
        let mut switch = rig.limit_switch(AxisId::Z, vec![Some(Duration::ZERO)]);
        rig.log().clear();

        let started = Instant::now();
        let moved = axis.move_relative(10.0, 5.0).await.unwrap();
        let seek = axis
            .move_until_trigger(true, 5.0, &mut switch, DEFAULT_TRIGGER_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(moved, MoveOutcome::Skipped(SkipReason::NotConfigured));
        assert_eq!(seek, TriggerOutcome::Skipped(SkipReason::NotConfigured));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(rig.log().events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_speed_and_tiny_distance_are_skipped() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::B);
        axis.configure(3200.0, 1.0).unwrap();
        rig.log().clear();

        assert_eq!(
            axis.move_relative(1.0, 0.0).await.unwrap(),
            MoveOutcome::Skipped(SkipReason::NonPositiveSpeed)
        );
        assert_eq!(
            axis.move_relative(1.0, f64::NAN).await.unwrap(),
            MoveOutcome::Skipped(SkipReason::NonPositiveSpeed)
        );
        assert_eq!(
            axis.move_relative(0.0001, 5.0).await.unwrap(),
            MoveOutcome::Skipped(SkipReason::ZeroSteps)
        );
        assert!(rig.log().events().is_empty());
    }

    #[test]
    fn configure_rejects_degenerate_mechanics() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::A);

        assert!(axis.configure(12800.0, 0.0).is_err());
        assert!(axis.configure(12800.0, -5.0).is_err());
        assert!(axis.configure(0.0, 5.0).is_err());
        assert!(axis.configure(f64::INFINITY, 5.0).is_err());
        assert_eq!(axis.steps_per_unit(), 0.0);

        axis.configure(12800.0, 5.0).unwrap();
        assert_eq!(axis.steps_per_unit(), 2560.0);
    }

    #[tokio::test(start_paused = true)]
    async fn relative_move_waits_for_direction_then_pulses_for_computed_time() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::B);
        let pulses = rig.pulse_monitor(AxisId::B);
        axis.configure(1000.0, 1.0).unwrap();
        rig.log().clear();

        let started = Instant::now();
        let outcome = axis.move_relative(-2.0, 1.0).await.unwrap();

        // 2000 steps at 1000 Hz after the 50 ms setup.
        assert_eq!(
            outcome,
            MoveOutcome::Completed {
                steps: 2000,
                frequency_hz: 1000
            }
        );
        assert_eq!(started.elapsed(), DIRECTION_SETUP + Duration::from_secs(2));
        assert!(!pulses.is_active());

        let timeline = rig.log().timeline();
        assert_eq!(
            timeline[0].1,
            RigEvent::Direction {
                axis: AxisId::B,
                reverse: true
            }
        );
        assert_eq!(
            timeline[1].1,
            RigEvent::PulseStart {
                axis: AxisId::B,
                frequency_hz: 1000
            }
        );
        assert_eq!(timeline[1].0 - timeline[0].0, DIRECTION_SETUP);
        assert_eq!(timeline[2].1, RigEvent::PulseIdle { axis: AxisId::B });
    }

    #[tokio::test(start_paused = true)]
    async fn frequency_is_clamped_at_driver_ceiling() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::Z);
        axis.configure(12800.0, 5.0).unwrap();
        rig.log().clear();

        // 20 mm/s * 2560 steps/mm = 51200 Hz requested.
        let outcome = axis.move_relative(5.0, 20.0).await.unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Completed {
                steps: 12800,
                frequency_hz: MAX_PULSE_FREQUENCY_HZ as u32
            }
        );
        assert_eq!(rig.log().pulse_starts(AxisId::Z), [(false, 40_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn direction_pin_follows_sign_of_distance() {
        let expectations = [Transaction::set(State::High), Transaction::set(State::Low)];
        let dir = PinMock::new(&expectations);
        let mut done_handle = dir.clone();

        let rig = SimRig::new();
        let mut axis = StepperAxis::new(AxisId::C, rig.pulse(AxisId::C), dir);
        axis.configure(40_000.0, 1.0).unwrap();

        axis.move_relative(-0.001, 1.0).await.unwrap();
        axis.move_relative(0.001, 1.0).await.unwrap();

        done_handle.done();
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_move_stops_when_switch_closes() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::A);
        let mut end = rig.limit_switch(AxisId::A, vec![Some(Duration::from_millis(500))]);
        axis.configure(12800.0, 75.0).unwrap();
        rig.log().clear();

        let outcome = axis
            .move_until_trigger(true, 80.0, &mut end, DEFAULT_TRIGGER_TIMEOUT)
            .await
            .unwrap();

        let TriggerOutcome::Triggered { elapsed } = outcome else {
            panic!("expected trigger, got {:?}", outcome);
        };
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));
        assert!(!rig.pulse_monitor(AxisId::A).is_active());
        assert_eq!(rig.log().pulse_starts(AxisId::A), [(false, 13653)]);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_move_times_out_and_idles() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::A);
        let mut home = rig.limit_switch(AxisId::A, vec![None]);
        axis.configure(12800.0, 75.0).unwrap();

        let started = Instant::now();
        let outcome = axis
            .move_until_trigger(false, 10.0, &mut home, Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::TimedOut);
        assert!(started.elapsed() >= DIRECTION_SETUP + Duration::from_millis(200));
        assert!(!rig.pulse_monitor(AxisId::A).is_active());
        assert_eq!(rig.log().pulse_starts(AxisId::A), [(true, 1706)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pulse_start_leaves_output_idle() {
        let mut rig = SimRig::new();
        rig.fail_pulse_start(AxisId::Z);
        let mut axis = rig.stepper(AxisId::Z);
        axis.configure(200.0, 1.0).unwrap();

        let err = axis.move_relative(1.0, 1.0).await.unwrap_err();

        assert!(matches!(err, AxisError::Pulse { axis: AxisId::Z, .. }));
        assert!(!rig.pulse_monitor(AxisId::Z).is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn switch_fault_mid_pulse_leaves_output_idle() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::A);
        let mut broken = rig.faulty_limit_switch(AxisId::A);
        axis.configure(12800.0, 75.0).unwrap();

        let err = axis
            .move_until_trigger(true, 10.0, &mut broken, DEFAULT_TRIGGER_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, AxisError::Limit { axis: AxisId::A, .. }));
        assert!(!rig.pulse_monitor(AxisId::A).is_active());
        let events = rig.log().events();
        assert_eq!(events.last(), Some(&RigEvent::PulseIdle { axis: AxisId::A }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_move_leaves_output_idle() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::Z);
        let pulses = rig.pulse_monitor(AxisId::Z);
        axis.configure(200.0, 1.0).unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            axis.move_relative(10.0, 1.0),
        )
        .await;

        assert!(cancelled.is_err());
        assert!(!pulses.is_active());
        assert_eq!(rig.log().pulse_starts(AxisId::Z).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_distance_is_refused() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::Z);
        axis.configure(12800.0, 5.0).unwrap();
        rig.log().clear();

        for distance in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = axis.move_relative(distance, 20.0).await.unwrap_err();
            assert!(matches!(err, AxisError::InvalidDistance { axis: AxisId::Z, .. }));
        }
        assert!(rig.log().events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlong_move_is_refused() {
        let rig = SimRig::new();
        let mut axis = rig.stepper(AxisId::B);
        axis.configure(1.0, 1.0).unwrap();
        rig.log().clear();

        let started = Instant::now();
        let err = axis.move_relative(1e30, 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            AxisError::MoveTooLong {
                axis: AxisId::B,
                frequency_hz: 1,
                ..
            }
        ));

        // One step past the limit at 1 Hz.
        let err = axis.move_relative(3601.0, 1.0).await.unwrap_err();
        assert!(matches!(err, AxisError::MoveTooLong { steps: 3601, .. }));

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(rig.log().events().is_empty());
    }
}
