//! Nightscout entry source.
//!
//! Provides the [`EntrySource`] trait for abstracting where CGM entries come
//! from and the [`NightscoutClient`] implementation that queries the
//! Nightscout REST API over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::models::Entry;

/// Errors that can occur while fetching entries from Nightscout.
#[derive(Debug, Error)]
pub enum NightscoutError {
    /// The configured base URL does not parse.
    #[error("Invalid Nightscout base URL: {message}")]
    InvalidBaseUrl {
        /// Parser diagnostic for the rejected URL.
        message: String,
    },

    /// The HTTP request could not be completed.
    #[error("Request to Nightscout failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Nightscout answered with a non-success status code.
    #[error("Non-success response from Nightscout: {status}")]
    Status {
        /// The status code returned by the upstream.
        status: StatusCode,
    },

    /// The response body is not a JSON array of entries.
    #[error("Response body is not a JSON entry array: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A source of CGM entries.
///
/// The polling agent only ever asks for the most recent entry; the trait
/// exists so the loop can be exercised against scripted sources in tests.
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Fetches the most recent entries (at most one in practice).
    ///
    /// An empty vector means no new data within the lookback window and is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success HTTP status, or a
    /// response body that does not decode as an entry array.
    async fn fetch_latest(&self) -> Result<Vec<Entry>, NightscoutError>;
}

/// HTTP client for the Nightscout entries API.
///
/// Each fetch issues
/// `GET {base_url}/api/v1/entries.json?token=...&count=1&find[date][$gte]=...`
/// where the `$gte` cutoff is "now minus the lookback window", so only
/// recent records are ever returned.
#[derive(Debug)]
pub struct NightscoutClient {
    http: reqwest::Client,
    entries_url: Url,
    token: String,
    lookback_secs: i64,
}

impl NightscoutClient {
    /// Creates a client for the given Nightscout instance.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the Nightscout instance (no trailing path)
    /// * `token` - Access token passed as a query parameter
    /// * `lookback_secs` - Recency cutoff window in seconds
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` does not parse as a URL.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        lookback_secs: i64,
    ) -> Result<Self, NightscoutError> {
        let entries_url = Url::parse(&format!(
            "{}/api/v1/entries.json",
            base_url.trim_end_matches('/')
        ))
        .map_err(|e| NightscoutError::InvalidBaseUrl {
            message: e.to_string(),
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            entries_url,
            token: token.into(),
            // Out-of-range windows would overflow the cutoff arithmetic.
            lookback_secs: lookback_secs.clamp(0, 366 * 24 * 60 * 60),
        })
    }

    /// Returns the start of the recency window for a fetch issued now.
    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::seconds(self.lookback_secs)
    }

    /// Builds the entries request URL for the given cutoff.
    fn request_url(&self, cutoff_ms: i64) -> Url {
        let mut url = self.entries_url.clone();
        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .append_pair("count", "1")
            .append_pair("find[date][$gte]", &cutoff_ms.to_string());
        url
    }

    /// Builds the request URL with the token redacted, for log output.
    fn display_url(&self, cutoff_ms: i64) -> Url {
        let mut url = self.entries_url.clone();
        url.query_pairs_mut()
            .append_pair("token", "<redacted>")
            .append_pair("count", "1")
            .append_pair("find[date][$gte]", &cutoff_ms.to_string());
        url
    }
}

#[async_trait]
impl EntrySource for NightscoutClient {
    async fn fetch_latest(&self) -> Result<Vec<Entry>, NightscoutError> {
        let cutoff = self.cutoff();
        let cutoff_ms = cutoff.timestamp_millis();

        tracing::info!(
            cutoff = %cutoff.to_rfc3339(),
            url = %self.display_url(cutoff_ms),
            "Requesting entries since cutoff"
        );

        let response = self.http.get(self.request_url(cutoff_ms)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NightscoutError::Status { status });
        }

        let body = response.text().await?;
        tracing::debug!(payload = %body, "Received entries payload");

        let entries: Vec<Entry> = serde_json::from_str(&body)?;
        Ok(entries)
    }
}
