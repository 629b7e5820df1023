//! Client side of the line protocol, as an orchestrator uses it.

use std::time::Duration;

use stepper_axis::AxisId;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::debug;

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error("controller rejected '{command}': {reply}")]
    Rejected { command: String, reply: String },

    #[error("no reply to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("connection closed by controller")]
    Closed,

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ControllerClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    reply_timeout: Duration,
}

impl ControllerClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A, reply_timeout: Duration) -> Result<Self, ClientError> {
        let stream = timeout(reply_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })?
            .map_err(ClientError::Connect)?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            reply_timeout,
        })
    }

    /// Sends one command and waits for its reply line. Replies containing
    /// `OK` or `DONE` are successes, anything else is a rejection.
    pub async fn send_command(&mut self, command: &str) -> Result<String, ClientError> {
        self.writer
            .write_all(format!("{}\n", command).as_bytes())
            .await?;

        let mut line = String::new();
        let read = timeout(self.reply_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| ClientError::Timeout {
                command: command.to_string(),
                timeout: self.reply_timeout,
            })??;
        if read == 0 {
            return Err(ClientError::Closed);
        }

        let reply = line.trim().to_string();
        debug!("'{}' -> '{}'", command, reply);

        if reply.contains("OK") || reply.contains("DONE") {
            Ok(reply)
        } else {
            Err(ClientError::Rejected {
                command: command.to_string(),
                reply,
            })
        }
    }

    pub async fn config_axis(
        &mut self,
        axis: AxisId,
        pulses_per_revolution: f64,
        lead: f64,
    ) -> Result<String, ClientError> {
        self.send_command(&format!(
            "CONFIG_AXIS,{},{},{}",
            axis, pulses_per_revolution, lead
        ))
        .await
    }

    pub async fn config_z_peel(
        &mut self,
        lift: f64,
        ret: f64,
        speed_down: f64,
        speed_up: f64,
    ) -> Result<String, ClientError> {
        self.send_command(&format!(
            "CONFIG_Z_PEEL,{},{},{},{}",
            lift, ret, speed_down, speed_up
        ))
        .await
    }

    pub async fn config_a_wipe(&mut self, fast: f64, slow: f64) -> Result<String, ClientError> {
        self.send_command(&format!("CONFIG_A_WIPE,{},{}", fast, slow))
            .await
    }

    pub async fn next_layer(&mut self) -> Result<String, ClientError> {
        self.send_command("NEXT_LAYER").await
    }

    /// Acceleration is sent as twice the speed.
    pub async fn move_relative(
        &mut self,
        axis: AxisId,
        distance: f64,
        speed: f64,
    ) -> Result<String, ClientError> {
        self.send_command(&format!(
            "MOVE_REL,{},{},{},{}",
            axis,
            distance,
            speed,
            speed * 2.0
        ))
        .await
    }
}
