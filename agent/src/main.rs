//! Nightscout2Datadog Agent Binary
//!
//! Entry point for the CGM polling daemon. Exits 0 on clean shutdown and
//! nonzero when required configuration is missing at startup.

#![deny(unsafe_code)]

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load a local .env before configuration is read
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    agent::run().await
}
