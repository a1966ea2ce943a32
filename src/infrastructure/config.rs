//! Configuration infrastructure
//!
//! Configuration is layered:
//! 1. Built-in defaults (`AppConfig::default()`)
//! 2. JSON config file in the user config directory (written on first run)
//! 3. Environment variables prefixed `PARCEL_CONSULT__` (`__` separates nesting)

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Application directory name under the platform config/data dirs
pub const APP_DIR_NAME: &str = "parcel-consult";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PARCEL_CONSULT";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote lookup settings
    pub consult: ConsultConfig,

    /// Channel sizing for the controller/engine plumbing
    pub runtime: RuntimeConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote lookup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultConfig {
    /// Parcel detail page prefix; the parcel code and a trailing `/` are appended
    pub base_url: String,

    /// Pause between two consecutive lookups (밀리초)
    pub request_delay_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Owner name and denomination are cut to this many characters
    pub max_text_field_chars: usize,

    /// Cookie file override; defaults to the application data directory
    pub cookies_path: Option<PathBuf>,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sigef.incra.gov.br/geo/parcela/detalhe/".to_string(),
            request_delay_ms: 2000,
            request_timeout_secs: 30,
            user_agent: format!("parcel-consult/{}", env!("CARGO_PKG_VERSION")),
            max_text_field_chars: 60,
            cookies_path: None,
        }
    }
}

/// Channel capacities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Controller → engine command queue
    pub engine_command_capacity: usize,

    /// Engine → controller event queue
    pub engine_event_capacity: usize,

    /// UI → runtime request queue
    pub request_capacity: usize,

    /// Controller → observers broadcast buffer
    pub observer_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine_command_capacity: 16,
            engine_event_capacity: 256,
            request_capacity: 16,
            observer_capacity: 256,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output (stderr, stdout carries the result lines)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory override; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Fixed UTC offset used for timestamps (Brasília = -3)
    pub utc_offset_hours: i32,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            utc_offset_hours: -3,
            max_files: 10,
            module_filters: HashMap::new(),
        }
    }
}

/// Configuration manager for loading and saving settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Create a configuration manager for the default location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    /// Create a configuration manager for an explicit file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write defaults on first run, then load the layered configuration
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 First run detected - writing default configuration to {:?}", self.config_path);
            self.save_config(&AppConfig::default()).await?;
        }
        self.load_config()
    }

    /// Load defaults, then the config file (if present), then environment overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration source")?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(self.config_path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", self.config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Configuration file has an unexpected shape")?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write configuration file: {:?}", self.config_path))?;

        info!("💾 Configuration saved to: {:?}", self.config_path);
        Ok(())
    }
}
