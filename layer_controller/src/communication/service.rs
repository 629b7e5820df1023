use std::{
    net::IpAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, warn};
use utilities::command_queue::{QueueClosed, QueueSender};

use crate::{
    config::ServerConfig,
    display::StatusDisplay,
    models::{CommandEnvelope, Reply},
};

/// Register for the one client the controller serves at a time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSlot {
    occupied: Arc<AtomicBool>,
}

impl ConnectionSlot {
    pub fn try_acquire(&self) -> Option<ConnectionLease> {
        self.occupied
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ConnectionLease {
                occupied: self.occupied.clone(),
            })
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::SeqCst)
    }
}

/// Holds the slot until dropped.
#[derive(Debug)]
pub struct ConnectionLease {
    occupied: Arc<AtomicBool>,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.occupied.store(false, Ordering::SeqCst);
    }
}

pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| anyhow!("Failed to bind to {}:{}: {}", config.host, config.port, e))?;

    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

pub async fn run_communication_layer(
    listener: TcpListener,
    command_tx: QueueSender<CommandEnvelope>,
    display: Arc<dyn StatusDisplay>,
) -> Result<()> {
    let slot = ConnectionSlot::default();
    let host = listener.local_addr()?.ip();

    loop {
        let (socket, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("Failed to accept connection: {}", e))?;

        let Some(lease) = slot.try_acquire() else {
            warn!("Rejecting {}: another client is connected", peer);
            tokio::spawn(reject(socket));
            continue;
        };

        info!("Client {} connected", peer);
        display.update(
            "Status: Online",
            &format!("IP: {}", host),
            "Client Connected",
            "",
        );

        let command_tx = command_tx.clone();
        let display = display.clone();

        tokio::spawn(async move {
            let _lease = lease;
            handle_client(socket, command_tx, display.as_ref(), host).await;
            info!("Client {} released", peer);
        });
    }
}

async fn reject(mut socket: TcpStream) {
    let line = format!("{}\n", Reply::Busy);
    if let Err(e) = socket.write_all(line.as_bytes()).await {
        debug!("Failed to tell rejected client it is busy: {}", e);
    }
    if let Err(e) = socket.shutdown().await {
        debug!("Failed to close rejected client: {}", e);
    }
}

/// Reads lines until the peer goes away. Each line is queued immediately;
/// the reply receivers go to the writer task in arrival order, so the
/// reader never waits for a command to finish.
async fn handle_client(
    socket: TcpStream,
    command_tx: QueueSender<CommandEnvelope>,
    display: &dyn StatusDisplay,
    host: IpAddr,
) {
    let (reader, writer) = socket.into_split();
    let (pending_tx, pending_rx) = mpsc::unbounded_channel();

    // Detached: replies to commands already queued are still attempted
    // after the peer closes its side.
    tokio::spawn(write_replies(writer, pending_rx));

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                debug!("Received '{}'", line);

                let (response, reply) = oneshot::channel();
                if let Err(QueueClosed(envelope)) = command_tx.push(CommandEnvelope { line, response }) {
                    error!("Controller is not running, failing '{}'", envelope.line);
                    if envelope
                        .response
                        .send(Reply::Failed("controller is not running".to_string()))
                        .is_err()
                    {
                        debug!("Reply writer is gone, dropping failure reply");
                    }
                }

                if pending_tx.send(reply).is_err() {
                    warn!("Reply writer stopped, closing connection");
                    break;
                }
            }
            Ok(None) => {
                info!("Client disconnected");
                display.update(
                    "Status: Online",
                    &format!("IP: {}", host),
                    "Client Disconn.",
                    "",
                );
                break;
            }
            Err(e) => {
                warn!("Error reading from client: {}", e);
                display.update("Status: ERROR", "Client Read Err", "", "");
                break;
            }
        }
    }
}

async fn write_replies(
    mut writer: OwnedWriteHalf,
    mut pending: mpsc::UnboundedReceiver<oneshot::Receiver<Reply>>,
) {
    while let Some(reply) = pending.recv().await {
        let Ok(reply) = reply.await else {
            warn!("Command was dropped without a reply");
            continue;
        };

        let line = format!("{}\n", reply);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("Failed to send reply '{}': {}", reply, e);
        }
    }
}
