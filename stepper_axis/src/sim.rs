//! Simulated rig: pulse outputs, direction pins and limit switches that
//! record what the driver does to them.
//!
//! Limit switches are tied to an axis' pulse output. A switch closes once
//! that axis has been pulsing for the delay scheduled for the current seek
//! attempt, which is how a blade reaching its end stop looks from the
//! controller.

use std::{
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use tokio::time::Instant;

use crate::{AxisId, StepperAxis, limit::ActiveLowSwitch, pulse::PulseOutput};

pub type SimAxis = StepperAxis<SimPulse, SimPin>;
pub type SimSwitch = ActiveLowSwitch<SimTrigger>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigEvent {
    Direction { axis: AxisId, reverse: bool },
    PulseStart { axis: AxisId, frequency_hz: u32 },
    PulseIdle { axis: AxisId },
}

impl RigEvent {
    pub fn axis(&self) -> AxisId {
        match self {
            RigEvent::Direction { axis, .. }
            | RigEvent::PulseStart { axis, .. }
            | RigEvent::PulseIdle { axis } => *axis,
        }
    }
}

/// Shared, timestamped record of every output change on the rig.
#[derive(Debug, Clone, Default)]
pub struct RigLog {
    events: Arc<Mutex<Vec<(Instant, RigEvent)>>>,
}

impl RigLog {
    fn record(&self, event: RigEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((Instant::now(), event));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn timeline(&self) -> Vec<(Instant, RigEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<RigEvent> {
        self.timeline().into_iter().map(|(_, event)| event).collect()
    }

    /// Every pulse train started on `axis`, with the direction latched at
    /// that moment (`true` = reverse).
    pub fn pulse_starts(&self, axis: AxisId) -> Vec<(bool, u32)> {
        self.motions()
            .into_iter()
            .filter(|(id, _, _)| *id == axis)
            .map(|(_, reverse, frequency_hz)| (reverse, frequency_hz))
            .collect()
    }

    /// Every pulse train on the rig in start order: axis, reverse flag and
    /// frequency.
    pub fn motions(&self) -> Vec<(AxisId, bool, u32)> {
        let mut reverse = [false; 4];
        let mut motions = Vec::new();

        for event in self.events() {
            match event {
                RigEvent::Direction { axis, reverse: r } => reverse[index(axis)] = r,
                RigEvent::PulseStart { axis, frequency_hz } => {
                    motions.push((axis, reverse[index(axis)], frequency_hz))
                }
                RigEvent::PulseIdle { .. } => {}
            }
        }

        motions
    }
}

fn index(axis: AxisId) -> usize {
    match axis {
        AxisId::Z => 0,
        AxisId::A => 1,
        AxisId::B => 2,
        AxisId::C => 3,
    }
}

#[derive(Debug, Default)]
struct PulseState {
    active_since: Option<Instant>,
    session: u64,
}

/// Read-only view of a simulated pulse output.
#[derive(Debug, Clone, Default)]
pub struct PulseMonitor {
    state: Arc<Mutex<PulseState>>,
}

impl PulseMonitor {
    pub fn is_active(&self) -> bool {
        self.active_since().is_some()
    }

    pub fn active_since(&self) -> Option<Instant> {
        self.state.lock().ok().and_then(|state| state.active_since)
    }

    /// Number of pulse trains started so far.
    pub fn session(&self) -> u64 {
        self.state.lock().map(|state| state.session).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFault;

impl digital::Error for SimFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct SimPulse {
    axis: AxisId,
    log: RigLog,
    monitor: PulseMonitor,
    fail_start: bool,
}

impl PulseOutput for SimPulse {
    type Error = SimFault;

    fn start(&mut self, frequency_hz: u32) -> Result<(), SimFault> {
        if let Ok(mut state) = self.monitor.state.lock() {
            state.active_since = Some(Instant::now());
            state.session += 1;
        }
        self.log.record(RigEvent::PulseStart {
            axis: self.axis,
            frequency_hz,
        });

        // The channel is already running when the fault is reported.
        if self.fail_start { Err(SimFault) } else { Ok(()) }
    }

    fn idle(&mut self) {
        let was_active = self
            .monitor
            .state
            .lock()
            .map(|mut state| state.active_since.take().is_some())
            .unwrap_or(false);

        if was_active {
            self.log.record(RigEvent::PulseIdle { axis: self.axis });
        }
    }
}

pub struct SimPin {
    axis: AxisId,
    log: RigLog,
    high: Arc<AtomicBool>,
}

impl SimPin {
    pub fn is_set_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    fn set(&mut self, high: bool) {
        self.high.store(high, Ordering::SeqCst);
        self.log.record(RigEvent::Direction {
            axis: self.axis,
            reverse: high,
        });
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

/// Counts how many seeks a [`SimTrigger`] has observed.
#[derive(Debug, Clone, Default)]
pub struct AttemptCounter(Arc<AtomicUsize>);

impl AttemptCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limit switch input with pull-up: reads high while open, low once closed.
///
/// `schedule[n]` is the pulsing time after which the switch closes during
/// the n-th seek; `None` means it never closes. The last entry repeats.
pub struct SimTrigger {
    monitor: PulseMonitor,
    schedule: Vec<Option<Duration>>,
    attempts: AttemptCounter,
    last_session: Option<u64>,
    faulty: bool,
}

impl SimTrigger {
    pub fn attempts(&self) -> AttemptCounter {
        self.attempts.clone()
    }

    fn closed(&mut self) -> bool {
        let Some(since) = self.monitor.active_since() else {
            return false;
        };

        let session = self.monitor.session();
        if self.last_session != Some(session) {
            self.last_session = Some(session);
            self.attempts.0.fetch_add(1, Ordering::SeqCst);
        }

        let attempt = self.attempts.get().saturating_sub(1);
        let delay = self
            .schedule
            .get(attempt)
            .or(self.schedule.last())
            .copied()
            .flatten();

        match delay {
            Some(delay) => since.elapsed() >= delay,
            None => false,
        }
    }
}

impl ErrorType for SimTrigger {
    type Error = SimFault;
}

impl InputPin for SimTrigger {
    fn is_high(&mut self) -> Result<bool, SimFault> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, SimFault> {
        if self.faulty {
            return Err(SimFault);
        }
        Ok(self.closed())
    }
}

/// Builder and handle for a simulated four-axis machine.
pub struct SimRig {
    log: RigLog,
    monitors: [PulseMonitor; 4],
    failing_starts: [bool; 4],
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            log: RigLog::default(),
            monitors: Default::default(),
            failing_starts: [false; 4],
        }
    }

    pub fn log(&self) -> &RigLog {
        &self.log
    }

    pub fn pulse_monitor(&self, axis: AxisId) -> PulseMonitor {
        self.monitors[index(axis)].clone()
    }

    /// Makes every later pulse start on `axis` report a fault.
    pub fn fail_pulse_start(&mut self, axis: AxisId) {
        self.failing_starts[index(axis)] = true;
    }

    pub fn pulse(&self, axis: AxisId) -> SimPulse {
        SimPulse {
            axis,
            log: self.log.clone(),
            monitor: self.pulse_monitor(axis),
            fail_start: self.failing_starts[index(axis)],
        }
    }

    pub fn direction_pin(&self, axis: AxisId) -> SimPin {
        SimPin {
            axis,
            log: self.log.clone(),
            high: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stepper(&self, axis: AxisId) -> SimAxis {
        StepperAxis::new(axis, self.pulse(axis), self.direction_pin(axis))
    }

    pub fn limit_switch(&self, axis: AxisId, schedule: Vec<Option<Duration>>) -> SimSwitch {
        let trigger = SimTrigger {
            monitor: self.pulse_monitor(axis),
            schedule,
            attempts: AttemptCounter::default(),
            last_session: None,
            faulty: false,
        };
        ActiveLowSwitch::new(trigger)
    }

    /// A switch whose input read always fails.
    pub fn faulty_limit_switch(&self, axis: AxisId) -> SimSwitch {
        let trigger = SimTrigger {
            monitor: self.pulse_monitor(axis),
            schedule: Vec::new(),
            attempts: AttemptCounter::default(),
            last_session: None,
            faulty: true,
        };
        ActiveLowSwitch::new(trigger)
    }
}

#[cfg(test)]
mod tests {
    use utilities::motor_controller::LimitSwitch;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn switch_follows_schedule_per_attempt() {
        let rig = SimRig::new();
        let mut pulse = rig.pulse(AxisId::A);
        let mut switch = rig.limit_switch(
            AxisId::A,
            vec![None, Some(Duration::from_millis(100))],
        );

        assert!(!switch.is_triggered().unwrap());

        pulse.start(1000).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!switch.is_triggered().unwrap());
        pulse.idle();

        pulse.start(1000).unwrap();
        assert!(!switch.is_triggered().unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(switch.is_triggered().unwrap());
        pulse.idle();

        assert_eq!(switch.into_inner().attempts().get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn log_pairs_pulses_with_latched_direction() {
        let rig = SimRig::new();
        let mut pulse = rig.pulse(AxisId::Z);
        let mut dir = rig.direction_pin(AxisId::Z);

        dir.set_high().unwrap();
        pulse.start(200).unwrap();
        pulse.idle();
        pulse.idle();
        dir.set_low().unwrap();
        pulse.start(400).unwrap();
        pulse.idle();

        assert_eq!(rig.log().pulse_starts(AxisId::Z), [(true, 200), (false, 400)]);
        let idles = rig
            .log()
            .events()
            .into_iter()
            .filter(|e| matches!(e, RigEvent::PulseIdle { .. }))
            .count();
        assert_eq!(idles, 2);
        assert!(!dir.is_set_high());
    }
}
