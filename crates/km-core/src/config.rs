//! Monitor configuration.
//!
//! Resolution order: `--config` path → `KILN_MONITOR_CONFIG` →
//! `$XDG_CONFIG_HOME/kiln-monitor/config.toml` → built-in defaults.
//! An explicitly named file must exist; the XDG file is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use km_common::AnalysisSettings;

use crate::hub::DEFAULT_BACKLOG_MAX_POINTS;
use crate::simulator::ThermalParams;

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG_PATH: &str = "KILN_MONITOR_CONFIG";

const APP_NAME: &str = "kiln-monitor";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Where the active configuration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Display name used as the sender of every notification.
    pub sender_name: String,
    /// File-based delivery: one JSON envelope per notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbox_dir: Option<PathBuf>,
    /// HTTP delivery; requires the `webhook` feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sender_name: "Kiln Monitor".to_string(),
            outbox_dir: None,
            webhook_url: None,
        }
    }
}

/// Simulated kiln settings used by `km simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per poll.
    pub time_step_secs: f64,
    /// Wall-clock acceleration; the poll interval is `time_step_secs / speedup`.
    pub speedup: f64,
    #[serde(flatten)]
    pub thermal: ThermalParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step_secs: 2.0,
            speedup: 1.0,
            thermal: ThermalParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory holding run records and rendered artifacts.
    pub storage_dir: PathBuf,
    /// Cap on samples replayed to a newly attached viewer.
    pub backlog_max_points: usize,
    /// URL at which the monitor is reachable, announced on run start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub analysis: AnalysisSettings,
    pub notify: NotifyConfig,
    pub simulation: SimulationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            backlog_max_points: DEFAULT_BACKLOG_MAX_POINTS,
            public_url: None,
            analysis: AnalysisSettings::default(),
            notify: NotifyConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("history")
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

impl MonitorConfig {
    /// Parse TOML text. `origin` is used in error messages only.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let mut config: MonitorConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.storage_dir = expand_home(&config.storage_dir);
        if let Some(dir) = config.notify.outbox_dir.take() {
            config.notify.outbox_dir = Some(expand_home(&dir));
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        if !(a.smoothing_scale.is_finite() && a.smoothing_scale > 0.0) {
            return Err(invalid(
                "analysis.smoothing_scale",
                format!("must be positive, got {}", a.smoothing_scale),
            ));
        }
        if !a.unload_temperature.is_finite() {
            return Err(invalid("analysis.unload_temperature", "must be finite"));
        }
        if !(a.peak_zoom.is_finite() && a.peak_zoom >= 0.0) {
            return Err(invalid(
                "analysis.peak_zoom",
                format!("must be non-negative, got {}", a.peak_zoom),
            ));
        }
        if self.backlog_max_points < 2 {
            return Err(invalid(
                "backlog_max_points",
                format!("must be at least 2, got {}", self.backlog_max_points),
            ));
        }
        let sim = &self.simulation;
        if !(sim.time_step_secs.is_finite() && sim.time_step_secs > 0.0) {
            return Err(invalid(
                "simulation.time_step_secs",
                format!("must be positive, got {}", sim.time_step_secs),
            ));
        }
        if !(sim.speedup.is_finite() && sim.speedup > 0.0) {
            return Err(invalid(
                "simulation.speedup",
                format!("must be positive, got {}", sim.speedup),
            ));
        }
        sim.thermal
            .validate()
            .map_err(|message| invalid("simulation", message))?;
        if self.notify.sender_name.trim().is_empty() {
            return Err(invalid("notify.sender_name", "must not be empty"));
        }
        Ok(())
    }
}

/// Configuration plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MonitorConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Load and validate configuration using the standard resolution order.
pub fn load_config(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let xdg = dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILENAME));
    load_with(cli_path, |key| std::env::var(key).ok(), xdg)
}

fn load_with<F>(
    cli_path: Option<&Path>,
    lookup: F,
    xdg_path: Option<PathBuf>,
) -> Result<LoadedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (path, source) = if let Some(p) = cli_path {
        (Some(p.to_path_buf()), ConfigSource::CliArgument)
    } else if let Some(p) = lookup(ENV_CONFIG_PATH).filter(|v| !v.is_empty()) {
        (Some(PathBuf::from(p)), ConfigSource::Environment)
    } else if let Some(p) = xdg_path.filter(|p| p.is_file()) {
        (Some(p), ConfigSource::XdgConfig)
    } else {
        (None, ConfigSource::BuiltinDefault)
    };

    let config = match &path {
        Some(p) => read_config_file(p)?,
        None => MonitorConfig::default(),
    };
    config.validate()?;
    debug!(source = %source, path = ?path, "configuration resolved");
    Ok(LoadedConfig {
        config,
        path,
        source,
    })
}

fn read_config_file(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    MonitorConfig::from_toml_str(&text, path)
}
