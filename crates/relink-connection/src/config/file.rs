//! Loading `RelinkConfig` from TOML and the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RetryPolicyConfig;
use crate::reconnect::ReconnectConfig;

/// Environment variables that override file settings
const ENV_MAX_TRIES: &str = "RELINK_MAX_TRIES";
const ENV_RETRY_WAIT: &str = "RELINK_RETRY_WAIT";
const ENV_ENABLE_RETRY: &str = "RELINK_ENABLE_RETRY";
const ENV_RETRY_READ_ONLY: &str = "RELINK_RETRY_READ_ONLY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Full configuration: statement retry policy plus reconnect backoff
///
/// ```toml
/// [retry]
/// max_tries = 7
/// retry_wait_seconds = 0.5
/// enable_retry = true
/// retry_read_only = true
///
/// [reconnect]
/// max_attempts = 7
/// intervals = [0.2, 0.5, 1.0, 2.0, 3.0, 3.0, 3.0]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelinkConfig {
    pub retry: RetryPolicyConfig,
    pub reconnect: ReconnectConfig,
}

impl RelinkConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded relink config");
        Ok(config)
    }

    /// Apply `RELINK_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup` (keyed by `RELINK_*` names).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_MAX_TRIES) {
            let tries = value
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(ENV_MAX_TRIES, &value))?;
            self.retry.set_max_tries(tries);
        }
        if let Some(value) = lookup(ENV_RETRY_WAIT) {
            let wait = value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| invalid(ENV_RETRY_WAIT, &value))?;
            self.retry.set_retry_wait(wait);
        }
        if let Some(value) = lookup(ENV_ENABLE_RETRY) {
            let enabled = parse_flag(&value).ok_or_else(|| invalid(ENV_ENABLE_RETRY, &value))?;
            self.retry.set_enable_retry(enabled);
        }
        if let Some(value) = lookup(ENV_RETRY_READ_ONLY) {
            let read_only =
                parse_flag(&value).ok_or_else(|| invalid(ENV_RETRY_READ_ONLY, &value))?;
            self.retry.set_retry_read_only(read_only);
        }
        Ok(self)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
