use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use stepper_axis::AxisId;

use crate::controller::params::LayerParameters;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8899,
        }
    }
}

/// Drive mechanics of one axis, as sent with `CONFIG_AXIS`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisSetup {
    pub pulses_per_revolution: f64,
    pub lead: f64,
}

/// Axes listed here are configured at startup; the rest wait for
/// `CONFIG_AXIS`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<AxisSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<AxisSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<AxisSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<AxisSetup>,
}

impl AxesConfig {
    pub fn get(&self, axis: AxisId) -> Option<AxisSetup> {
        match axis {
            AxisId::Z => self.z,
            AxisId::A => self.a,
            AxisId::B => self.b,
            AxisId::C => self.c,
        }
    }

    pub fn configured(&self) -> impl Iterator<Item = (AxisId, AxisSetup)> + '_ {
        AxisId::ALL
            .into_iter()
            .filter_map(|axis| self.get(axis).map(|setup| (axis, setup)))
    }
}

/// Behaviour of the simulated limit switches used by the host build.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub end_trigger_after_ms: u64,
    pub home_trigger_after_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            end_trigger_after_ms: 500,
            home_trigger_after_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enables a daily rolling log file in this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "layer_controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerControllerConfig {
    pub server: ServerConfig,
    pub layer: LayerParameters,
    pub axes: AxesConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

impl LayerControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::ValidationError { message };

        if self.server.port == 0 {
            return Err(invalid("server.port must not be 0".to_string()));
        }

        self.layer
            .validate()
            .map_err(|message| invalid(format!("layer: {}", message)))?;

        for (axis, setup) in self.axes.configured() {
            let valid = setup.pulses_per_revolution.is_finite()
                && setup.lead.is_finite()
                && setup.pulses_per_revolution > 0.0
                && setup.lead > 0.0;
            if !valid {
                return Err(invalid(format!(
                    "axes.{}: pulses_per_revolution and lead must be positive",
                    axis
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("default_config.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    pub fn load(&self) -> anyhow::Result<LayerControllerConfig> {
        let config_path = &self.options.config_path;

        if !config_path.exists() {
            if self.options.create_if_missing {
                let default_config = LayerControllerConfig::default();
                self.save(&default_config)
                    .context("Failed to save default config")?;
                return Ok(default_config);
            } else {
                return Err(ConfigError::FileNotFound {
                    path: config_path.clone(),
                }
                .into());
            }
        }

        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError { source: e })?;

        let config: LayerControllerConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &LayerControllerConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, LayerControllerConfig)> {
    init_config_with_options(ConfigOptions::default())
}

pub fn init_config_with_options(
    options: ConfigOptions,
) -> anyhow::Result<(ConfigManager, LayerControllerConfig)> {
    let manager = ConfigManager::with_options(options);
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<()> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let options = ConfigOptions {
        config_path,
        create_if_missing: true,
    };

    let manager = ConfigManager::with_options(options);
    manager.save(&LayerControllerConfig::default())?;

    Ok(())
}
