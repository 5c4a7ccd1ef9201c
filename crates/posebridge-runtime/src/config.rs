//! Runtime configuration
//!
//! Defaults suit a 60 Hz display. Every field can be overridden from the
//! environment:
//! - `POSEBRIDGE_RETRY_DELAY` (humantime, e.g. `250ms`)
//! - `POSEBRIDGE_RETRY_MAX_DELAY` (humantime)
//! - `POSEBRIDGE_RETRY_FACTOR` (float >= 1.0)
//! - `POSEBRIDGE_MAX_CREATE_ATTEMPTS` (integer >= 1)
//! - `POSEBRIDGE_FRAME_INTERVAL` (humantime, or `off` for manually posted frames)
//! - `POSEBRIDGE_LOG_FORMAT` (`pretty`, `compact` or `json`)

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::telemetry::LogFormat;

pub const ENV_RETRY_DELAY: &str = "POSEBRIDGE_RETRY_DELAY";
pub const ENV_RETRY_MAX_DELAY: &str = "POSEBRIDGE_RETRY_MAX_DELAY";
pub const ENV_RETRY_FACTOR: &str = "POSEBRIDGE_RETRY_FACTOR";
pub const ENV_MAX_CREATE_ATTEMPTS: &str = "POSEBRIDGE_MAX_CREATE_ATTEMPTS";
pub const ENV_FRAME_INTERVAL: &str = "POSEBRIDGE_FRAME_INTERVAL";
pub const ENV_LOG_FORMAT: &str = "POSEBRIDGE_LOG_FORMAT";

/// One display frame at 60 Hz
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}: invalid duration '{value}': {source}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{var}: invalid value '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Retry policy for create preconditions
    pub retry: RetryPolicy,
    /// Display link period; `None` means frames are posted by the caller
    pub frame_interval: Option<Duration>,
    /// Subscriber format installed when a bridge starts
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            retry: RetryPolicy::default(),
            frame_interval: Some(DEFAULT_FRAME_INTERVAL),
            log_format: LogFormat::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `POSEBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();

        if let Some(value) = lookup(ENV_RETRY_DELAY) {
            config.retry.delay = parse_duration(ENV_RETRY_DELAY, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_MAX_DELAY) {
            config.retry.max_delay = parse_duration(ENV_RETRY_MAX_DELAY, &value)?;
        } else if config.retry.max_delay < config.retry.delay {
            config.retry.max_delay = config.retry.delay;
        }
        if let Some(value) = lookup(ENV_RETRY_FACTOR) {
            config.retry.backoff_factor =
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        var: ENV_RETRY_FACTOR,
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(value) = lookup(ENV_MAX_CREATE_ATTEMPTS) {
            config.retry.max_attempts =
                value
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| ConfigError::InvalidValue {
                        var: ENV_MAX_CREATE_ATTEMPTS,
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(value) = lookup(ENV_FRAME_INTERVAL) {
            config.frame_interval = if value.trim().eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse_duration(ENV_FRAME_INTERVAL, &value)?)
            };
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            config.log_format = value
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::InvalidValue {
                    var: ENV_LOG_FORMAT,
                    value: value.clone(),
                    reason,
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "max create attempts must be at least 1".into(),
            ));
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return Err(ConfigError::Inconsistent(format!(
                "retry factor {} must be finite and >= 1.0",
                retry.backoff_factor
            )));
        }
        if retry.max_delay < retry.delay {
            return Err(ConfigError::Inconsistent(format!(
                "retry max delay {:?} is below the base delay {:?}",
                retry.max_delay, retry.delay
            )));
        }
        if self.frame_interval == Some(Duration::ZERO) {
            return Err(ConfigError::Inconsistent(
                "frame interval must be non-zero (use 'off' to disable)".into(),
            ));
        }
        Ok(())
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        var,
        value: value.to_string(),
        source,
    })
}
