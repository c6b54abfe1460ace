//! Nightscout2Datadog Agent
//!
//! This crate provides the polling daemon that bridges a Nightscout CGM
//! feed into Datadog. Once per interval it asks Nightscout for the most
//! recent entry, validates it, suppresses duplicates via a timestamp
//! watermark, and publishes the glucose value as a gauge sample.
//!
//! # Architecture
//!
//! The agent is a single sequential loop built on Tokio:
//! - [`Config`] is read once from environment variables at startup
//! - [`Poller`] owns all mutable state (the dedup watermark) and drives
//!   fetch → validate → dedup → emit on every tick
//! - Shutdown is cooperative: SIGTERM/Ctrl+C resolve a future the loop
//!   selects on during its inter-tick sleep
//!
//! # Example
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     agent::run().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod poller;

pub use config::Config;
pub use poller::{Poller, TickOutcome, CGM_METRIC};

use anyhow::Result;
use shared::datadog::{DatadogClient, MetricSink};
use shared::nightscout::NightscoutClient;
use std::sync::Arc;

/// Runs the polling agent until a shutdown signal is received.
///
/// Loads configuration from environment variables, initializes the Datadog
/// and Nightscout clients, publishes the startup marker event, and enters
/// the polling loop. Returns cleanly on SIGTERM/Ctrl+C.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Either client rejects its configured URL
pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    run_with_config(config).await
}

/// Runs the polling agent with the provided configuration.
///
/// This is useful for testing or when you want to provide configuration
/// programmatically.
///
/// # Errors
///
/// Returns an error if either client rejects its configured URL.
pub async fn run_with_config(config: Config) -> Result<()> {
    tracing::info!("Starting...");

    let sink: Arc<dyn MetricSink> = Arc::new(DatadogClient::new(
        &config.datadog_api_host,
        &config.datadog_api_key,
        &config.datadog_app_key,
    )?);
    tracing::info!(api_host = %config.datadog_api_host, "Datadog initialized...");

    // Startup marker event; a failed publish is not fatal.
    if let Err(err) = sink
        .event("nightscout2datadog starting", "nightscout_to_datadog starting")
        .await
    {
        tracing::warn!(error = %err, "Failed to publish startup event");
    }

    let source = Arc::new(NightscoutClient::new(
        &config.nightscout_base_url,
        config.nightscout_token.clone(),
        config.lookback_secs,
    )?);

    let mut poller = Poller::new(source, sink, config.poll_interval());
    poller.run_until(shutdown_signal()).await;

    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            nightscout_base_url: "https://cgm.example.com".to_string(),
            nightscout_token: "s3cret".to_string(),
            datadog_api_key: "api-key".to_string(),
            datadog_app_key: "app-key".to_string(),
            datadog_api_host: "https://us5.datadoghq.com".to_string(),
            poll_interval_secs: 60,
            lookback_secs: 120,
        }
    }

    #[tokio::test]
    async fn test_run_with_config_rejects_bad_api_host() {
        let config = Config {
            datadog_api_host: "not a url".to_string(),
            ..test_config()
        };

        assert!(run_with_config(config).await.is_err());
    }

    #[test]
    fn test_cgm_metric_name() {
        assert_eq!(CGM_METRIC, "nightscout.cgm.latest");
    }
}
