//! Storage configuration.
//!
//! The connector never reads the environment: everything it needs is in a
//! [`StorageConfig`] value, typically loaded from a TOML file.
//!
//! ```toml
//! root = "/srv/lake"
//! timezone = "Europe/Warsaw"
//! ```
//!
//! Only local roots are served; any other URL scheme fails on connect.
//! Unknown keys, such as a `[remote]` table, are a parse error.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_TIMEZONE: &str = "Europe/Warsaw";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection settings for the object-store root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Object-store root: a local path or a `file://` URL.
    pub root: String,

    /// IANA timezone applied to every temporal computation.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl StorageConfig {
    /// Config for a local root with the default timezone.
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            timezone: default_timezone(),
        }
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.trim().is_empty() {
            return Err(ConfigError::Invalid("root must not be empty".into()));
        }
        self.tz()?;
        Ok(())
    }

    /// The configured timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("timezone '{}': {e}", self.timezone)))
    }
}
