//! Datadog metric sink.
//!
//! Provides the [`MetricSink`] trait for publishing gauge samples and
//! service events, the [`DatadogClient`] implementation backed by the
//! Datadog v1 HTTP API, and an in-memory [`RecordingSink`] for development
//! and testing.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors that can occur while publishing to the metrics backend.
#[derive(Debug, Error)]
pub enum DatadogError {
    /// The configured API host does not parse as a URL.
    #[error("Invalid Datadog API host: {message}")]
    InvalidApiHost {
        /// Parser diagnostic for the rejected host.
        message: String,
    },

    /// The HTTP request could not be completed.
    #[error("Request to Datadog failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Datadog answered with a non-success status code.
    #[error("Non-success response from Datadog: {status}")]
    Status {
        /// The status code returned by the API.
        status: StatusCode,
    },
}

/// A sink for gauge samples and service events.
///
/// The polling agent publishes one gauge sample per accepted reading plus a
/// single startup event; the trait exists so the loop can be exercised
/// against an in-memory sink in tests.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Publishes a single gauge sample under `metric`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success HTTP status.
    async fn gauge(&self, metric: &str, value: f64) -> Result<(), DatadogError>;

    /// Publishes a service event with the given title and text.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success HTTP status.
    async fn event(&self, title: &str, text: &str) -> Result<(), DatadogError>;
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: [Series<'a>; 1],
}

#[derive(Serialize)]
struct Series<'a> {
    metric: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    points: [(i64, f64); 1],
}

#[derive(Serialize)]
struct EventPayload<'a> {
    title: &'a str,
    text: &'a str,
}

/// HTTP client for the Datadog v1 metrics and events API.
///
/// Gauge samples go to `POST {api_host}/api/v1/series`, events to
/// `POST {api_host}/api/v1/events`, authenticated with the `DD-API-KEY` and
/// `DD-APPLICATION-KEY` headers.
#[derive(Debug)]
pub struct DatadogClient {
    http: reqwest::Client,
    series_url: Url,
    events_url: Url,
    api_key: String,
    app_key: String,
}

impl DatadogClient {
    /// Creates a client for the given Datadog site.
    ///
    /// # Arguments
    ///
    /// * `api_host` - API host, e.g. `https://us5.datadoghq.com`
    /// * `api_key` - Value for the `DD-API-KEY` header
    /// * `app_key` - Value for the `DD-APPLICATION-KEY` header
    ///
    /// # Errors
    ///
    /// Returns an error if `api_host` does not parse as a URL.
    pub fn new(
        api_host: &str,
        api_key: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Result<Self, DatadogError> {
        let host = api_host.trim_end_matches('/');
        let parse = |suffix: &str| {
            Url::parse(&format!("{host}{suffix}")).map_err(|e| DatadogError::InvalidApiHost {
                message: e.to_string(),
            })
        };

        Ok(Self {
            http: reqwest::Client::new(),
            series_url: parse("/api/v1/series")?,
            events_url: parse("/api/v1/events")?,
            api_key: api_key.into(),
            app_key: app_key.into(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &Url, body: &T) -> Result<(), DatadogError> {
        let response = self
            .http
            .post(url.clone())
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatadogError::Status { status });
        }

        Ok(())
    }
}

#[async_trait]
impl MetricSink for DatadogClient {
    async fn gauge(&self, metric: &str, value: f64) -> Result<(), DatadogError> {
        let payload = SeriesPayload {
            series: [Series {
                metric,
                kind: "gauge",
                points: [(Utc::now().timestamp(), value)],
            }],
        };

        self.post(&self.series_url, &payload).await
    }

    async fn event(&self, title: &str, text: &str) -> Result<(), DatadogError> {
        let payload = EventPayload { title, text };
        self.post(&self.events_url, &payload).await
    }
}

/// A single call observed by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    /// A gauge sample.
    Gauge {
        /// Metric name.
        metric: String,
        /// Sample value.
        value: f64,
    },
    /// A service event.
    Event {
        /// Event title.
        title: String,
        /// Event text.
        text: String,
    },
}

/// In-memory metric sink that records every successful call.
///
/// Useful for development and testing: publishes nothing, and can be
/// switched into a failing mode to exercise publish-failure paths. Calls
/// made while failing are not recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls fail (or succeed again) with an HTTP 500.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns all recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().clone()
    }

    /// Returns the recorded values for the given gauge metric, in order.
    #[must_use]
    pub fn gauge_values(&self, metric: &str) -> Vec<f64> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Gauge { metric: m, value } if m == metric => Some(*value),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: SinkCall) -> Result<(), DatadogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatadogError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }

        self.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn gauge(&self, metric: &str, value: f64) -> Result<(), DatadogError> {
        self.record(SinkCall::Gauge {
            metric: metric.to_string(),
            value,
        })
    }

    async fn event(&self, title: &str, text: &str) -> Result<(), DatadogError> {
        self.record(SinkCall::Event {
            title: title.to_string(),
            text: text.to_string(),
        })
    }
}
