use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tour::MissingTargetPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tour: TourSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timing and skip behaviour of the sequencer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourSettings {
    /// Milliseconds to wait for a step's targets (default: 5000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Milliseconds between document polls (default: 16, one 60Hz frame)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// What to do when a step's targets never appear: skip or finish
    #[serde(default)]
    pub missing_target: MissingTargetPolicy,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_frame_interval_ms() -> u64 {
    16
}

impl TourSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for TourSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            missing_target: MissingTargetPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a file in `dir` instead of stderr
    #[serde(default)]
    pub to_file: bool,

    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            dir: default_log_dir(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so guidepost works without config files
        let defaults_json = serde_json::to_string(&Config::default())
            .context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // User config in ~/.config/guidepost/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("guidepost").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. GUIDEPOST__TOUR__TIMEOUT_MS=100
        builder = builder.add_source(
            config::Environment::with_prefix("GUIDEPOST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    /// Absolute path to the log directory
    pub fn logs_path(&self) -> std::path::PathBuf {
        let path = std::path::PathBuf::from(&self.logging.dir);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }
}
