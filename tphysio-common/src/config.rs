//! Configuration model and TOML loading
//!
//! Resolution order for the config file path:
//! 1. Explicit path (command-line argument or `TPHYSIO_CONFIG`)
//! 2. `<config_dir>/tphysio/tphysio-ai.toml`
//!
//! A missing file is not an error; every field has a default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default elevation batch size (points per provider request)
pub const DEFAULT_ELEVATION_BATCH_SIZE: usize = 100;
/// Default number of elevation batches in flight at once
pub const DEFAULT_ELEVATION_CONCURRENCY: usize = 3;
/// Default attempts per elevation batch / per model tier
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default exponential backoff base (delay = base^attempt seconds)
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;

/// Top-level TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Gemini API key (environment variables take priority)
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub providers: ProviderConfig,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive, used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "tphysio_ai=info,tower_http=info".to_string()
}

/// Tunables of the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Points per elevation request
    pub elevation_batch_size: usize,
    /// Elevation requests in flight at once
    pub elevation_concurrency: usize,
    /// Attempts per elevation batch before the stage fails
    pub elevation_max_attempts: u32,
    /// Attempts per model tier before advancing to the next tier
    pub analysis_max_attempts: u32,
    /// Backoff delay = backoff_base_secs ^ attempt
    pub backoff_base_secs: u64,
    /// Model tiers, tried in order
    pub model_tiers: Vec<String>,
    /// Transport timeout for weather/elevation requests
    pub http_timeout_secs: u64,
    /// Transport timeout for text generation requests
    pub generation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            elevation_batch_size: DEFAULT_ELEVATION_BATCH_SIZE,
            elevation_concurrency: DEFAULT_ELEVATION_CONCURRENCY,
            elevation_max_attempts: DEFAULT_MAX_ATTEMPTS,
            analysis_max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            model_tiers: vec![
                "gemini-1.5-flash-latest".to_string(),
                "gemini-1.5-pro-latest".to_string(),
            ],
            http_timeout_secs: 30,
            generation_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    /// Reject values that would stall or disable the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.elevation_batch_size == 0 {
            return Err(Error::Config("elevation_batch_size must be > 0".to_string()));
        }
        if self.elevation_concurrency == 0 {
            return Err(Error::Config("elevation_concurrency must be > 0".to_string()));
        }
        if self.elevation_max_attempts == 0 || self.analysis_max_attempts == 0 {
            return Err(Error::Config("max attempts must be > 0".to_string()));
        }
        if self.model_tiers.is_empty() {
            return Err(Error::Config("at least one model tier is required".to_string()));
        }
        Ok(())
    }
}

/// Which elevation service backs the elevation stage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElevationBackend {
    #[default]
    OpenElevation,
    OpenMeteo,
}

/// External provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub forecast_url: String,
    pub archive_url: String,
    pub elevation_backend: ElevationBackend,
    pub open_elevation_url: String,
    pub open_meteo_elevation_url: String,
    pub gemini_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            elevation_backend: ElevationBackend::OpenElevation,
            open_elevation_url: "https://api.open-elevation.com/api/v1/lookup".to_string(),
            open_meteo_elevation_url: "https://api.open-meteo.com/v1/elevation".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// Default config file location for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tphysio").join("tphysio-ai.toml"))
}

/// Load TOML config from `path`, falling back to defaults if the file does not exist
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.pipeline.validate()?;

    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the config path (explicit path first) and load it
pub fn resolve_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            load_toml_config(path)
        }
        None => match default_config_path() {
            Some(path) => load_toml_config(&path),
            None => Ok(TomlConfig::default()),
        },
    }
}
