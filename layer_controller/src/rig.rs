//! Wiring of the simulated machine the host binary drives.

use std::{sync::Arc, time::Duration};

use stepper_axis::{
    AxisError, AxisId,
    sim::{SimAxis, SimRig},
};
use tracing::info;

use crate::{
    config::LayerControllerConfig,
    controller::{Axes, WipeLimits, sequencer::LayerSequencer},
    display::StatusDisplay,
};

/// Builds a sequencer over `rig`: four simulated axes, the two wipe limit
/// switches with the configured trigger delays, the configured layer
/// parameters and every axis pre-configuration from the file.
pub fn build_sequencer(
    rig: &SimRig,
    config: &LayerControllerConfig,
    display: Arc<dyn StatusDisplay>,
) -> Result<LayerSequencer<SimAxis>, AxisError> {
    let simulation = &config.simulation;
    let limits = WipeLimits::new(
        rig.limit_switch(
            AxisId::A,
            vec![Some(Duration::from_millis(simulation.end_trigger_after_ms))],
        ),
        rig.limit_switch(
            AxisId::A,
            vec![Some(Duration::from_millis(simulation.home_trigger_after_ms))],
        ),
    );

    let mut sequencer = LayerSequencer::new(
        Axes::new(|axis| rig.stepper(axis)),
        limits,
        config.layer.clone(),
        display,
    );

    for (axis, setup) in config.axes.configured() {
        sequencer.configure_axis(axis, setup.pulses_per_revolution, setup.lead)?;
    }

    info!(
        "Simulated rig ready (end switch after {} ms, home switch after {} ms)",
        simulation.end_trigger_after_ms, simulation.home_trigger_after_ms
    );
    Ok(sequencer)
}

#[cfg(test)]
mod tests {
    use utilities::motor_controller::Motor;

    use super::*;
    use crate::{config::AxisSetup, display::RecordingDisplay};

    #[tokio::test(start_paused = true)]
    async fn pre_configured_axes_are_ready() {
        let rig = SimRig::new();
        let mut config = LayerControllerConfig::default();
        config.axes.z = Some(AxisSetup {
            pulses_per_revolution: 12800.0,
            lead: 5.0,
        });
        config.axes.a = Some(AxisSetup {
            pulses_per_revolution: 12800.0,
            lead: 75.0,
        });

        let mut sequencer =
            build_sequencer(&rig, &config, Arc::new(RecordingDisplay::new())).unwrap();

        assert_eq!(sequencer.axis(AxisId::Z).steps_per_unit(), 2560.0);
        assert_eq!(sequencer.axis(AxisId::B).steps_per_unit(), 0.0);
        sequencer.next_layer().await.unwrap();
        assert_eq!(rig.log().motions().len(), 6);
    }

    #[test]
    fn bad_pre_configuration_is_an_error() {
        let rig = SimRig::new();
        let mut config = LayerControllerConfig::default();
        config.axes.c = Some(AxisSetup {
            pulses_per_revolution: -1.0,
            lead: 5.0,
        });

        let result = build_sequencer(&rig, &config, Arc::new(RecordingDisplay::new()));
        assert!(matches!(
            result,
            Err(AxisError::InvalidConfiguration { axis: AxisId::C, .. })
        ));
    }
}
