//! Configuration management for turnstile.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::LimiterConfig;

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LIMITER__RATE`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter to drive
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Simulated traffic settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulated traffic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Requests issued per worker
    #[serde(default = "default_requests")]
    pub requests: usize,

    /// Pause between sequential requests in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound of random extra pause in milliseconds
    #[serde(default)]
    pub jitter_ms: u64,

    /// Concurrent callers; more than one runs without pauses
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            interval_ms: default_interval_ms(),
            jitter_ms: 0,
            workers: default_workers(),
        }
    }
}

impl SimulationConfig {
    /// Pause between sequential requests.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_requests() -> usize {
    12
}

fn default_interval_ms() -> u64 {
    300
}

fn default_workers() -> usize {
    1
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file layered under
    /// `TURNSTILE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Seed with the defaults so partial overrides merge over a complete tree.
        let defaults = Config::try_from(&TurnstileConfig::default())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;

        let config: TurnstileConfig = settings
            .try_deserialize()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file only.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde alone cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.simulation.workers == 0 {
            return Err(TurnstileError::Config(
                "simulation.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
