use std::{path::PathBuf, sync::Arc};

use anyhow::anyhow;
use layer_controller::{
    communication::service::{bind, run_communication_layer},
    config::{LayerControllerConfig, create_default_config, init_config},
    controller::controller_service::run_controller,
    display::{StatusDisplay, TracingDisplay},
    logging, rig,
};
use stepper_axis::sim::SimRig;
use tracing::{error, info};
use utilities::command_queue::command_queue;

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (_config_manager, config) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let _log_guard = logging::init(&config.logging)?;

    let display: Arc<dyn StatusDisplay> = Arc::new(TracingDisplay::new());
    display.update("4-Axis System", "Booting...", "", "");

    if let Err(e) = run(&config, display.clone()).await {
        error!("Fatal error: {:#}", e);
        display.update("FATAL ERROR", &e.to_string(), "", "");
        return Err(e);
    }

    Ok(())
}

async fn run(config: &LayerControllerConfig, display: Arc<dyn StatusDisplay>) -> anyhow::Result<()> {
    let rig = SimRig::new();
    let sequencer = rig::build_sequencer(&rig, config, display.clone())?;

    let listener = bind(&config.server).await?;
    display.update(
        "Status: Ready",
        &format!("IP: {}", config.server.host),
        "Waiting Client..",
        "",
    );

    let (command_tx, command_rx) = command_queue();
    info!("Layer controller ready");

    tokio::select! {
        result = run_controller(command_rx, sequencer) => {
            result?;
            Err(anyhow!("Controller stopped unexpectedly"))
        }
        result = run_communication_layer(listener, command_tx, display) => {
            result?;
            Err(anyhow!("Communication layer stopped unexpectedly"))
        }
    }
}
