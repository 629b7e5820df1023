use anyhow::Result;
use stepper_axis::AxisId;
use tracing::{error, info, warn};
use utilities::{command_queue::QueueReceiver, motor_controller::Motor};

use crate::{
    communication::commands::parse_command,
    controller::sequencer::LayerSequencer,
    models::{Command, CommandEnvelope, Reply},
};

const SHORT_COMMAND_LEN: usize = 16;

/// Drains the command queue one envelope at a time. Every command gets
/// exactly one reply; nothing a client sends can end this loop.
pub async fn run_controller<M: Motor>(
    mut command_rx: QueueReceiver<CommandEnvelope>,
    mut sequencer: LayerSequencer<M>,
) -> Result<()> {
    while let Some(envelope) = command_rx.pop().await {
        let CommandEnvelope { line, response } = envelope;
        let reply = execute_line(&mut sequencer, &line).await;

        if let Err(reply) = response.send(reply) {
            warn!("Client is gone, dropping reply '{}' to '{}'", reply, line);
        }
    }

    info!("Command queue closed, controller stopped");
    Ok(())
}

pub async fn execute_line<M: Motor>(sequencer: &mut LayerSequencer<M>, line: &str) -> Reply {
    let short = short_command(line);
    let cmd_line = format!("CMD: {}", short);
    sequencer
        .display()
        .update("Status: Running", &cmd_line, "", "");

    let reply = match parse_command(line) {
        Ok(command) => execute(sequencer, command).await,
        Err(e) => Reply::Failed(e.to_string()),
    };

    match &reply {
        Reply::Failed(reason) => {
            error!("Command '{}' failed: {}", line, reason);
            sequencer
                .display()
                .update("Status: ERROR", "Processing err", reason, "");
        }
        reply if reply.is_success() => {
            info!("Command '{}' -> {}", line, reply);
            sequencer
                .display()
                .update("Status: Online", "Last OK", &cmd_line, "");
        }
        reply => warn!("Command '{}' rejected: {}", line, reply),
    }

    reply
}

async fn execute<M: Motor>(sequencer: &mut LayerSequencer<M>, command: Command) -> Reply {
    match command {
        Command::ConfigAxis {
            axis,
            pulses_per_revolution,
            lead,
        } => {
            let Ok(id) = axis.parse::<AxisId>() else {
                return Reply::InvalidAxis;
            };
            match sequencer.configure_axis(id, pulses_per_revolution, lead) {
                Ok(()) => Reply::AxisConfigured(id.to_string()),
                Err(e) => Reply::Failed(e.to_string()),
            }
        }
        Command::ConfigZPeel {
            lift,
            ret,
            speed_down,
            speed_up,
        } => {
            sequencer
                .params_mut()
                .set_peel(lift, ret, speed_down, speed_up);
            Reply::PeelConfigured
        }
        Command::ConfigAWipe { fast, slow } => {
            sequencer.params_mut().set_wipe(fast, slow);
            Reply::WipeConfigured
        }
        Command::NextLayer => match sequencer.next_layer().await {
            Ok(()) => Reply::Done,
            Err(e) => Reply::Failed(e.to_string()),
        },
        Command::MoveRel { axis, request } => {
            let Ok(id) = axis.parse::<AxisId>() else {
                return Reply::InvalidAxis;
            };
            match sequencer.move_axis(id, request).await {
                Ok(_) => Reply::Done,
                Err(e) => Reply::Failed(e.to_string()),
            }
        }
        Command::Unknown => Reply::UnknownCommand,
    }
}

/// Command text as it fits on one display line.
pub fn short_command(line: &str) -> String {
    if line.chars().count() > SHORT_COMMAND_LEN {
        let head: String = line.chars().take(SHORT_COMMAND_LEN - 2).collect();
        format!("{}..", head)
    } else {
        line.to_string()
    }
}
