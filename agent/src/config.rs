//! Agent configuration module.
//!
//! Handles loading configuration from environment variables. The Nightscout
//! and Datadog credentials are required and their absence is a startup
//! error; everything else has a default.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use validator::Validate;

/// Default Datadog API host (the us5 site).
pub const DEFAULT_DATADOG_API_HOST: &str = "https://us5.datadoghq.com";

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default recency cutoff window in seconds.
pub const DEFAULT_LOOKBACK_SECS: i64 = 120;

/// Agent configuration.
///
/// Configuration values are read from environment variables:
/// - `NIGHTSCOUT_BASE_URL`: Base URL of the Nightscout instance (required)
/// - `NIGHTSCOUT_TOKEN`: Nightscout access token (required)
/// - `DATADOG_API_KEY`: Datadog API key (required)
/// - `DATADOG_APP_KEY`: Datadog application key (required)
/// - `DATADOG_API_HOST`: Datadog API host (default: `https://us5.datadoghq.com`)
/// - `POLL_INTERVAL_SECS`: Seconds between polls (default: 60)
/// - `NIGHTSCOUT_LOOKBACK_SECS`: Recency cutoff window in seconds (default: 120)
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Base URL of the Nightscout instance.
    #[validate(url(message = "NIGHTSCOUT_BASE_URL must be a valid URL"))]
    pub nightscout_base_url: String,

    /// Nightscout access token, appended to the entries query.
    #[validate(length(min = 1, message = "NIGHTSCOUT_TOKEN cannot be empty"))]
    pub nightscout_token: String,

    /// Datadog API key.
    #[validate(length(min = 1, message = "DATADOG_API_KEY cannot be empty"))]
    pub datadog_api_key: String,

    /// Datadog application key.
    #[validate(length(min = 1, message = "DATADOG_APP_KEY cannot be empty"))]
    pub datadog_app_key: String,

    /// Datadog API host.
    #[validate(url(message = "DATADOG_API_HOST must be a valid URL"))]
    pub datadog_api_host: String,

    /// Seconds between polling iterations.
    #[validate(range(min = 1, max = 3600, message = "POLL_INTERVAL_SECS out of range"))]
    pub poll_interval_secs: u64,

    /// Recency cutoff window in seconds for the entries query.
    #[validate(range(min = 1, max = 86400, message = "NIGHTSCOUT_LOOKBACK_SECS out of range"))]
    pub lookback_secs: i64,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, if a
    /// numeric variable does not parse, or if a value fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            nightscout_base_url: require(&lookup, "NIGHTSCOUT_BASE_URL")?,
            nightscout_token: require(&lookup, "NIGHTSCOUT_TOKEN")?,
            datadog_api_key: require(&lookup, "DATADOG_API_KEY")?,
            datadog_app_key: require(&lookup, "DATADOG_APP_KEY")?,
            datadog_api_host: lookup("DATADOG_API_HOST")
                .unwrap_or_else(|| DEFAULT_DATADOG_API_HOST.to_string()),
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            lookback_secs: parse_or(&lookup, "NIGHTSCOUT_LOOKBACK_SECS", DEFAULT_LOOKBACK_SECS)?,
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Returns the polling interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Reads a required variable, rejecting missing or empty values.
fn require(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!("{name} env var required"),
    }
}

/// Reads an optional numeric variable, falling back to `default`.
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number, got '{raw}'")),
    }
}
