use stepper_axis::AxisId;
use utilities::motor_controller::{LimitSwitch, Motor};

pub mod controller_service;
pub mod params;
pub mod sequencer;

/// The four axes of the machine, owned by the controller task.
pub struct Axes<M> {
    pub z: M,
    pub a: M,
    pub b: M,
    pub c: M,
}

impl<M: Motor> Axes<M> {
    pub fn new(mut build: impl FnMut(AxisId) -> M) -> Self {
        Self {
            z: build(AxisId::Z),
            a: build(AxisId::A),
            b: build(AxisId::B),
            c: build(AxisId::C),
        }
    }

    pub fn get(&self, axis: AxisId) -> &M {
        match axis {
            AxisId::Z => &self.z,
            AxisId::A => &self.a,
            AxisId::B => &self.b,
            AxisId::C => &self.c,
        }
    }

    pub fn get_mut(&mut self, axis: AxisId) -> &mut M {
        match axis {
            AxisId::Z => &mut self.z,
            AxisId::A => &mut self.a,
            AxisId::B => &mut self.b,
            AxisId::C => &mut self.c,
        }
    }
}

/// The two limit switches bounding the wipe axis.
pub struct WipeLimits {
    pub end: Box<dyn LimitSwitch>,
    pub home: Box<dyn LimitSwitch>,
}

impl WipeLimits {
    pub fn new(end: impl LimitSwitch + 'static, home: impl LimitSwitch + 'static) -> Self {
        Self {
            end: Box::new(end),
            home: Box::new(home),
        }
    }
}
