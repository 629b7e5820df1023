use embedded_hal::digital::InputPin;
use utilities::motor_controller::{LimitError, LimitSwitch};

/// Limit switch wired against a pull-up: the input reads low while the
/// switch is closed.
pub struct ActiveLowSwitch<P> {
    pin: P,
}

impl<P> ActiveLowSwitch<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn inner(&self) -> &P {
        &self.pin
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: InputPin + Send> LimitSwitch for ActiveLowSwitch<P> {
    fn is_triggered(&mut self) -> Result<bool, LimitError> {
        self.pin
            .is_low()
            .map_err(|e| LimitError(format!("{:?}", e)))
    }
}
