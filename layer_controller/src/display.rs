//! Four-line status mirror.
//!
//! Updates are best-effort: a failing display is logged and otherwise
//! ignored, motion never waits on it.

use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("display update failed: {0}")]
pub struct DisplayError(pub String);

pub trait StatusDisplay: Send + Sync {
    fn show(&self, lines: [&str; 4]) -> Result<(), DisplayError>;

    fn update(&self, line1: &str, line2: &str, line3: &str, line4: &str) {
        if let Err(e) = self.show([line1, line2, line3, line4]) {
            warn!("{}. Operation will continue.", e);
        }
    }
}

/// Mirrors the status lines into the log.
#[derive(Debug, Default)]
pub struct TracingDisplay;

impl TracingDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl StatusDisplay for TracingDisplay {
    fn show(&self, lines: [&str; 4]) -> Result<(), DisplayError> {
        let text = lines
            .iter()
            .filter(|line| !line.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" | ");
        info!(target: "display", "{}", text);
        Ok(())
    }
}

/// Keeps every screen it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    screens: Mutex<Vec<[String; 4]>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screens(&self) -> Vec<[String; 4]> {
        self.screens
            .lock()
            .map(|screens| screens.clone())
            .unwrap_or_default()
    }

    pub fn contains_line(&self, needle: &str) -> bool {
        self.screens()
            .iter()
            .any(|screen| screen.iter().any(|line| line == needle))
    }
}

impl StatusDisplay for RecordingDisplay {
    fn show(&self, lines: [&str; 4]) -> Result<(), DisplayError> {
        let mut screens = self
            .screens
            .lock()
            .map_err(|e| DisplayError(e.to_string()))?;
        screens.push(lines.map(str::to_string));
        Ok(())
    }
}
