//! Bridge configuration
//!
//! Read once at startup from `~/.padbridge/config.toml`. Every section has
//! defaults, so a missing file (or a missing section) still yields a working
//! bridge; only a file that exists but cannot be parsed is an error.

use crate::controller::SamplerSettings;
use crate::mock::bindings::MAX_CONTROLS;
use crate::mock::MockSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};

pub const CONFIG_DIR: &str = ".padbridge";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Where the sampler reads devices from
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Host device registry (gilrs)
    #[default]
    Host,
    /// Keyboard-driven mock gamepads
    Mock,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// File whose contents are reported to the consumer as user mappings
    pub user_mappings_file: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub source: SourceMode,
    pub sampler: SamplerSettings,
    pub mock: MockSettings,
    pub logging: LoggingConfig,
    pub environment: EnvironmentConfig,
}

impl BridgeConfig {
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the config from the default location
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            warn!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source,
                })?;

        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        debug!("Parsed config: {:?}", config);
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.sampler.frame_rate_hz) {
            return Err(ConfigError::ValidationError(format!(
                "sampler.frame_rate_hz must be between 1 and 1000, got {}",
                self.sampler.frame_rate_hz
            )));
        }
        if self.sampler.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "sampler.channel_capacity must be at least 1".to_string(),
            ));
        }
        if !self.mock.base_speed.is_finite() || self.mock.base_speed <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "mock.base_speed must be a positive number, got {}",
                self.mock.base_speed
            )));
        }
        if let Some(binding) = self.mock.bindings.iter().find(|b| b.target >= MAX_CONTROLS) {
            return Err(ConfigError::ValidationError(format!(
                "mock binding target {} exceeds the limit of {}",
                binding.target, MAX_CONTROLS
            )));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.logging.level.parse::<Level>().map_err(|_| {
            ConfigError::ValidationError(format!("unknown log level {:?}", self.logging.level))
        })
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
