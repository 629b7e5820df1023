//! Layer change choreography.
//!
//! `NEXT_LAYER` runs four strictly sequential steps on the build axis (Z)
//! and the wipe axis (A):
//!
//! 1. Z returns by the peel return distance, then settles.
//! 2. A wipes forward until the END switch closes, backs off and settles.
//! 3. Z lifts by the peel lift distance, then settles.
//! 4. A returns until the HOME switch closes (one retry), backs off and
//!    settles.
//!
//! A timeout on the END switch aborts the layer at once. The HOME return is
//! tried twice before the layer is aborted.

use std::{fmt, sync::Arc, time::Duration};

use stepper_axis::AxisId;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use utilities::motor_controller::{LimitSwitch, Motor, MoveOutcome, SkipReason, TriggerOutcome};

use crate::{
    controller::{
        Axes, WipeLimits,
        params::{LayerParameters, SequenceTiming},
    },
    display::StatusDisplay,
    models::MoveRequest,
};

const BUILD_AXIS: AxisId = AxisId::Z;
const WIPE_AXIS: AxisId = AxisId::A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Return,
    WipeToEnd,
    Peel,
    WipeToHome,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Step::Return => "step 1 (return)",
            Step::WipeToEnd => "step 2 (wipe to end)",
            Step::Peel => "step 3 (peel)",
            Step::WipeToHome => "step 4 (wipe to home)",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("{step}: axis {axis} did not reach the end limit within {timeout:?}")]
    WipeEndTimeout {
        step: Step,
        axis: AxisId,
        timeout: Duration,
    },

    #[error("{step}: axis {axis} did not reach the home limit within {timeout:?} after retry")]
    WipeHomeTimeout {
        step: Step,
        axis: AxisId,
        timeout: Duration,
    },

    #[error("{step}: axis {axis} cannot seek its limit: {reason}")]
    NotReady {
        step: Step,
        axis: AxisId,
        reason: SkipReason,
    },

    #[error("{step}: axis {axis} failed: {source}")]
    Axis {
        step: Step,
        axis: AxisId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SequenceError {
    pub fn step(&self) -> Step {
        match self {
            SequenceError::WipeEndTimeout { step, .. }
            | SequenceError::WipeHomeTimeout { step, .. }
            | SequenceError::NotReady { step, .. }
            | SequenceError::Axis { step, .. } => *step,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SequenceError::WipeEndTimeout { .. } | SequenceError::WipeHomeTimeout { .. }
        )
    }
}

/// Sole owner of the axes, the wipe limit switches and the layer
/// parameters. Lives inside the controller task.
pub struct LayerSequencer<M> {
    axes: Axes<M>,
    limits: WipeLimits,
    params: LayerParameters,
    timing: SequenceTiming,
    display: Arc<dyn StatusDisplay>,
}

impl<M: Motor> LayerSequencer<M> {
    pub fn new(
        axes: Axes<M>,
        limits: WipeLimits,
        params: LayerParameters,
        display: Arc<dyn StatusDisplay>,
    ) -> Self {
        Self {
            axes,
            limits,
            params,
            timing: SequenceTiming::default(),
            display,
        }
    }

    pub fn with_timing(mut self, timing: SequenceTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn params(&self) -> &LayerParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut LayerParameters {
        &mut self.params
    }

    pub fn axis(&self, axis: AxisId) -> &M {
        self.axes.get(axis)
    }

    pub fn display(&self) -> &dyn StatusDisplay {
        self.display.as_ref()
    }

    pub fn configure_axis(
        &mut self,
        axis: AxisId,
        pulses_per_revolution: f64,
        lead: f64,
    ) -> Result<(), M::Error> {
        self.axes
            .get_mut(axis)
            .configure(pulses_per_revolution, lead)
    }

    pub async fn move_axis(
        &mut self,
        axis: AxisId,
        request: MoveRequest,
    ) -> Result<MoveOutcome, M::Error> {
        debug!(
            "Axis {} relative move {} at {} (accel {} ignored)",
            axis, request.distance, request.speed, request.accel
        );
        self.axes
            .get_mut(axis)
            .move_relative(request.distance, request.speed)
            .await
    }

    pub async fn next_layer(&mut self) -> Result<(), SequenceError> {
        let params = self.params.clone();
        let timing = self.timing;
        info!("Layer change started");

        // 1
        self.display
            .update("Status: Printing", "Action: Return", "Z-Down...", "");
        self.relative(Step::Return, BUILD_AXIS, -params.peel_return_distance, params.z_speed_up)
            .await?;
        sleep(timing.return_settle).await;

        // 2
        self.display
            .update("Status: Printing", "Action: Wiping", "A-to-End", "");
        let outcome = self
            .seek(Step::WipeToEnd, true, params.wipe_speed_fast)
            .await?;
        if !outcome.is_triggered() {
            self.show_limit_timeout();
            return Err(SequenceError::WipeEndTimeout {
                step: Step::WipeToEnd,
                axis: WIPE_AXIS,
                timeout: timing.trigger_timeout,
            });
        }
        self.relative(
            Step::WipeToEnd,
            WIPE_AXIS,
            -timing.back_off_distance,
            params.wipe_speed_slow,
        )
        .await?;
        sleep(timing.wipe_settle).await;

        // 3
        self.display
            .update("Status: Printing", "Action: Peeling", "Z-Up...", "");
        self.relative(Step::Peel, BUILD_AXIS, params.peel_lift_distance, params.z_speed_down)
            .await?;
        sleep(timing.peel_settle).await;

        // 4
        self.display
            .update("Status: Printing", "Action: Wiping", "A-to-Home...", "");
        let mut outcome = self
            .seek(Step::WipeToHome, false, params.wipe_speed_slow)
            .await?;
        if !outcome.is_triggered() {
            warn!("Axis {} did not reach home, retrying once", WIPE_AXIS);
            self.display
                .update("Status: Printing", "Action: Wiping", "Retry A Home", "");
            outcome = self
                .seek(Step::WipeToHome, false, params.wipe_speed_slow)
                .await?;
        }
        if !outcome.is_triggered() {
            self.show_limit_timeout();
            return Err(SequenceError::WipeHomeTimeout {
                step: Step::WipeToHome,
                axis: WIPE_AXIS,
                timeout: timing.trigger_timeout,
            });
        }
        self.relative(
            Step::WipeToHome,
            WIPE_AXIS,
            timing.back_off_distance,
            params.wipe_speed_slow,
        )
        .await?;
        sleep(timing.wipe_settle).await;

        info!("Layer change finished");
        Ok(())
    }

    async fn relative(
        &mut self,
        step: Step,
        axis: AxisId,
        distance: f64,
        speed: f64,
    ) -> Result<MoveOutcome, SequenceError> {
        let outcome = self
            .axes
            .get_mut(axis)
            .move_relative(distance, speed)
            .await
            .map_err(|e| SequenceError::Axis {
                step,
                axis,
                source: Box::new(e),
            })?;

        if let MoveOutcome::Skipped(reason) = outcome {
            warn!("{}: axis {} did not move ({})", step, axis, reason);
        }
        Ok(outcome)
    }

    /// Runs the wipe axis towards one of its limits. Timeouts come back as
    /// an outcome, a skipped seek is an error.
    async fn seek(
        &mut self,
        step: Step,
        forward: bool,
        speed: f64,
    ) -> Result<TriggerOutcome, SequenceError> {
        let switch: &mut dyn LimitSwitch = if forward {
            self.limits.end.as_mut()
        } else {
            self.limits.home.as_mut()
        };

        let outcome = self
            .axes
            .a
            .move_until_trigger(forward, speed, switch, self.timing.trigger_timeout)
            .await
            .map_err(|e| SequenceError::Axis {
                step,
                axis: WIPE_AXIS,
                source: Box::new(e),
            })?;

        match outcome {
            TriggerOutcome::Skipped(reason) => Err(SequenceError::NotReady {
                step,
                axis: WIPE_AXIS,
                reason,
            }),
            outcome => Ok(outcome),
        }
    }

    fn show_limit_timeout(&self) {
        self.display.update(
            "Status: ERROR",
            "Limit Timeout",
            &format!("Axis: {}", WIPE_AXIS),
            "",
        );
    }
}
