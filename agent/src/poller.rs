//! The polling loop.
//!
//! Drives fetch → validate → dedup → emit once per tick, sleeping a fixed
//! interval between iterations regardless of outcome. The fixed sleep caps
//! the upstream request rate and bounds retry storms to one attempt per
//! interval; there is deliberately no backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shared::datadog::MetricSink;
use shared::dedup::Watermark;
use shared::models::Reading;
use shared::nightscout::{EntrySource, NightscoutError};

/// Metric name under which accepted readings are published.
pub const CGM_METRIC: &str = "nightscout.cgm.latest";

/// Outcome of a single polling iteration.
///
/// Every variant except [`TickOutcome::Emitted`] leaves the watermark
/// unchanged; none of them is fatal to the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A new reading was accepted and published.
    Emitted(Reading),
    /// Upstream returned no records within the lookback window.
    NoData,
    /// The candidate record was already reported.
    Duplicate {
        /// The rejected timestamp.
        timestamp_ms: i64,
    },
    /// The candidate record failed field validation.
    Invalid,
    /// The fetch failed: transport, status, or decode error.
    FetchFailed,
}

/// The polling state machine: entry source, metric sink, and the dedup
/// watermark, driven at a fixed interval.
pub struct Poller {
    source: Arc<dyn EntrySource>,
    sink: Arc<dyn MetricSink>,
    watermark: Watermark,
    interval: Duration,
}

impl Poller {
    /// Creates a poller over the given source and sink.
    #[must_use]
    pub fn new(source: Arc<dyn EntrySource>, sink: Arc<dyn MetricSink>, interval: Duration) -> Self {
        Self {
            source,
            sink,
            watermark: Watermark::new(),
            interval,
        }
    }

    /// Returns the timestamp of the last accepted reading (0 if none).
    #[must_use]
    pub fn last_accepted_ms(&self) -> i64 {
        self.watermark.last_accepted_ms()
    }

    /// Runs a single polling iteration.
    ///
    /// Fetches the latest entries, validates the first record, checks it
    /// against the dedup watermark, and publishes it as a gauge sample.
    /// Record-count policy: zero records is "no new data"; more than one
    /// record logs a warning and the first is processed.
    pub async fn tick(&mut self) -> TickOutcome {
        let entries = match self.source.fetch_latest().await {
            Ok(entries) => entries,
            Err(NightscoutError::Status { status }) => {
                tracing::warn!(%status, "Non-success response from Nightscout, will retry next tick");
                return TickOutcome::FetchFailed;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to fetch entries, will retry next tick");
                return TickOutcome::FetchFailed;
            }
        };

        let count = entries.len();
        let Some(entry) = entries.into_iter().next() else {
            tracing::info!("No new CGM records found within the lookback window");
            return TickOutcome::NoData;
        };

        if count > 1 {
            tracing::warn!(count, "Expected at most one record, processing the first");
        }

        let reading = match entry.to_reading() {
            Ok(reading) => reading,
            Err(err) => {
                let payload = serde_json::to_string_pretty(&entry)
                    .unwrap_or_else(|_| "<unserializable>".to_string());
                tracing::error!(error = %err, payload = %payload, "Record failed validation, skipping");
                return TickOutcome::Invalid;
            }
        };

        if !self.watermark.accept(reading.timestamp_ms) {
            tracing::info!(
                timestamp_ms = reading.timestamp_ms,
                timestamp = %reading.timestamp_rfc3339(),
                "Already processed CGM value, skipping"
            );
            return TickOutcome::Duplicate {
                timestamp_ms: reading.timestamp_ms,
            };
        }

        tracing::info!(
            value = reading.value,
            timestamp_ms = reading.timestamp_ms,
            timestamp = %reading.timestamp_rfc3339(),
            "Recording new CGM value"
        );

        // Publish failures are not retried; the watermark still advances.
        if let Err(err) = self.sink.gauge(CGM_METRIC, reading.value).await {
            tracing::warn!(error = %err, "Failed to publish gauge sample");
        }

        self.watermark.advance(reading.timestamp_ms);
        TickOutcome::Emitted(reading)
    }

    /// Runs the polling loop until `shutdown` resolves.
    ///
    /// The shutdown future is only observed between iterations or during
    /// the inter-tick sleep; an in-flight fetch is allowed to complete
    /// naturally.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let outcome = self.tick().await;
            tracing::debug!(?outcome, "Iteration complete");

            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested, exiting polling loop");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use shared::datadog::RecordingSink;
    use shared::models::Entry;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Entry source returning a scripted sequence of responses, then empty.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<Entry>, NightscoutError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<Entry>, NightscoutError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl EntrySource for ScriptedSource {
        async fn fetch_latest(&self) -> Result<Vec<Entry>, NightscoutError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn entry(date: i64, sgv: f64) -> Entry {
        Entry {
            date: Some(date),
            sgv: Some(sgv),
            ..Entry::default()
        }
    }

    fn poller_with(
        responses: Vec<Result<Vec<Entry>, NightscoutError>>,
    ) -> (Poller, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let poller = Poller::new(
            Arc::new(ScriptedSource::new(responses)),
            sink.clone(),
            Duration::from_secs(60),
        );
        (poller, sink)
    }

    #[tokio::test]
    async fn test_accept_then_duplicate_then_advance() {
        let (mut poller, sink) = poller_with(vec![
            Ok(vec![entry(1000, 120.0)]),
            Ok(vec![entry(1000, 120.0)]),
            Ok(vec![entry(1500, 118.0)]),
        ]);

        let first = poller.tick().await;
        assert!(matches!(first, TickOutcome::Emitted(r) if r.value == 120.0));
        assert_eq!(poller.last_accepted_ms(), 1000);

        let second = poller.tick().await;
        assert_eq!(second, TickOutcome::Duplicate { timestamp_ms: 1000 });
        assert_eq!(poller.last_accepted_ms(), 1000);

        let third = poller.tick().await;
        assert!(matches!(third, TickOutcome::Emitted(r) if r.value == 118.0));
        assert_eq!(poller.last_accepted_ms(), 1500);

        assert_eq!(sink.gauge_values(CGM_METRIC), vec![120.0, 118.0]);
    }

    #[tokio::test]
    async fn test_older_timestamp_is_rejected() {
        let (mut poller, sink) = poller_with(vec![
            Ok(vec![entry(2000, 110.0)]),
            Ok(vec![entry(1000, 120.0)]),
        ]);

        poller.tick().await;
        let outcome = poller.tick().await;

        assert_eq!(outcome, TickOutcome::Duplicate { timestamp_ms: 1000 });
        assert_eq!(poller.last_accepted_ms(), 2000);
        assert_eq!(sink.gauge_values(CGM_METRIC), vec![110.0]);
    }

    #[tokio::test]
    async fn test_empty_response_is_no_data() {
        let (mut poller, sink) = poller_with(vec![Ok(Vec::new())]);

        assert_eq!(poller.tick().await, TickOutcome::NoData);
        assert_eq!(poller.last_accepted_ms(), 0);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_date_is_invalid() {
        let (mut poller, sink) = poller_with(vec![Ok(vec![Entry {
            sgv: Some(120.0),
            ..Entry::default()
        }])]);

        assert_eq!(poller.tick().await, TickOutcome::Invalid);
        assert_eq!(poller.last_accepted_ms(), 0);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_value_is_invalid() {
        let (mut poller, sink) = poller_with(vec![Ok(vec![Entry {
            date: Some(1000),
            ..Entry::default()
        }])]);

        assert_eq!(poller.tick().await, TickOutcome::Invalid);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_is_survived() {
        let (mut poller, sink) = poller_with(vec![
            Err(NightscoutError::Status {
                status: StatusCode::BAD_GATEWAY,
            }),
            Ok(vec![entry(1000, 120.0)]),
        ]);

        assert_eq!(poller.tick().await, TickOutcome::FetchFailed);
        assert_eq!(poller.last_accepted_ms(), 0);

        assert!(matches!(poller.tick().await, TickOutcome::Emitted(_)));
        assert_eq!(sink.gauge_values(CGM_METRIC), vec![120.0]);
    }

    #[tokio::test]
    async fn test_over_return_processes_first_record() {
        let (mut poller, sink) = poller_with(vec![Ok(vec![
            entry(1500, 118.0),
            entry(1000, 120.0),
        ])]);

        let outcome = poller.tick().await;
        assert!(matches!(outcome, TickOutcome::Emitted(r) if r.timestamp_ms == 1500));
        assert_eq!(sink.gauge_values(CGM_METRIC), vec![118.0]);
    }

    #[tokio::test]
    async fn test_publish_failure_still_advances_watermark() {
        let (mut poller, sink) = poller_with(vec![
            Ok(vec![entry(1000, 120.0)]),
            Ok(vec![entry(1000, 120.0)]),
        ]);
        sink.set_failing(true);

        let outcome = poller.tick().await;
        assert!(matches!(outcome, TickOutcome::Emitted(_)));
        assert_eq!(poller.last_accepted_ms(), 1000);
        assert!(sink.calls().is_empty());

        // The same timestamp is not re-emitted once the sink recovers.
        sink.set_failing(false);
        assert_eq!(
            poller.tick().await,
            TickOutcome::Duplicate { timestamp_ms: 1000 }
        );
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_emitted_timestamps_strictly_increase() {
        let candidates = [1000, 1000, 500, 1500, 1500, 2000];
        let responses = candidates
            .iter()
            .map(|&ts| Ok(vec![entry(ts, 100.0)]))
            .collect();
        let (mut poller, sink) = poller_with(responses);

        let mut emitted = Vec::new();
        for _ in candidates {
            if let TickOutcome::Emitted(reading) = poller.tick().await {
                emitted.push(reading.timestamp_ms);
            }
        }

        assert_eq!(emitted, vec![1000, 1500, 2000]);
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sink.gauge_values(CGM_METRIC).len(), emitted.len());
    }

    #[tokio::test]
    async fn test_run_until_stops_on_completed_shutdown() {
        let (mut poller, sink) = poller_with(vec![Ok(vec![entry(1000, 120.0)])]);

        // An already-resolved shutdown future stops the loop after one tick.
        poller.run_until(std::future::ready(())).await;

        assert_eq!(sink.gauge_values(CGM_METRIC), vec![120.0]);
        assert_eq!(poller.last_accepted_ms(), 1000);
    }
}
