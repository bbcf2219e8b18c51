//! Convergence configuration loaded via `ortho-config`.

use std::ffi::OsString;
use std::num::NonZeroU32;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryBudget;
use crate::throttle::{ActionLimiter, DEFAULT_RATE_LIMIT_PER_SEC};

/// Timeouts and intervals used by the retry wrapper and the state poller.
///
/// Values merge defaults, configuration files, environment variables, and CLI
/// flags in that order of precedence.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DAYU",
    discovery(
        app_name = "dayu",
        env_var = "DAYU_CONFIG_PATH",
        config_file_name = "dayu.toml",
        dotfile_name = ".dayu.toml",
        project_file_name = "dayu.toml"
    )
)]
pub struct ConvergeConfig {
    /// Budget for read-oriented calls such as describe requests.
    #[ortho_config(default = 180)]
    pub read_timeout_secs: u64,
    /// Budget for write-oriented calls such as bind or modify requests.
    #[ortho_config(default = 300)]
    pub write_timeout_secs: u64,
    /// Fixed delay between attempts of a retried remote call.
    #[ortho_config(default = 1000)]
    pub retry_interval_ms: u64,
    /// Fixed delay between status polls after a mutation.
    #[ortho_config(default = 1000)]
    pub poll_interval_ms: u64,
    /// Calls allowed per second for each API action.
    #[ortho_config(default = 20)]
    pub rate_limit_per_sec: u32,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 180,
            write_timeout_secs: 300,
            retry_interval_ms: 1000,
            poll_interval_ms: 1000,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ConvergeConfig {
    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: set {} or {} in dayu.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration from every source, including CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        let config = Self::load().map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails and
    /// [`ConfigError::InvalidValue`] when a merged value is zero.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([OsString::from("dayu")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero timeouts and intervals. A zero interval would turn the
    /// retry and poll loops into busy loops.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the environment variable
    /// and TOML key of the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_positive(
            self.read_timeout_secs,
            &FieldMetadata::new(
                "read timeout",
                "DAYU_READ_TIMEOUT_SECS",
                "read_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.write_timeout_secs,
            &FieldMetadata::new(
                "write timeout",
                "DAYU_WRITE_TIMEOUT_SECS",
                "write_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.retry_interval_ms,
            &FieldMetadata::new(
                "retry interval",
                "DAYU_RETRY_INTERVAL_MS",
                "retry_interval_ms",
            ),
        )?;
        Self::require_positive(
            self.poll_interval_ms,
            &FieldMetadata::new(
                "poll interval",
                "DAYU_POLL_INTERVAL_MS",
                "poll_interval_ms",
            ),
        )?;
        Self::require_positive(
            u64::from(self.rate_limit_per_sec),
            &FieldMetadata::new(
                "rate limit",
                "DAYU_RATE_LIMIT_PER_SEC",
                "rate_limit_per_sec",
            ),
        )?;
        Ok(())
    }

    /// Budget applied to retried read calls.
    #[must_use]
    pub const fn read_budget(&self) -> RetryBudget {
        RetryBudget::new(
            Duration::from_secs(self.read_timeout_secs),
            Duration::from_millis(self.retry_interval_ms),
        )
    }

    /// Budget applied to retried write calls.
    #[must_use]
    pub const fn write_budget(&self) -> RetryBudget {
        RetryBudget::new(
            Duration::from_secs(self.write_timeout_secs),
            Duration::from_millis(self.retry_interval_ms),
        )
    }

    /// Budget applied to status polling after a mutation.
    ///
    /// Slow remote operations scale the read timeout by `multiplier`; a
    /// multiplier of zero is treated as one.
    #[must_use]
    pub fn poll_budget(&self, multiplier: u32) -> RetryBudget {
        let timeout = Duration::from_secs(self.read_timeout_secs).saturating_mul(multiplier.max(1));
        RetryBudget::new(timeout, Duration::from_millis(self.poll_interval_ms))
    }

    /// Per-action throttle allowing `rate_limit_per_sec` calls a second.
    ///
    /// A zero rate, which [`Self::validate`] rejects, is treated as one.
    #[must_use]
    pub fn action_limiter(&self) -> ActionLimiter {
        let rate = NonZeroU32::new(self.rate_limit_per_sec).unwrap_or(NonZeroU32::MIN);
        ActionLimiter::per_second(rate)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a configured value is outside its accepted range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
