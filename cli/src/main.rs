//! Nightscout2Datadog CLI
//!
//! One-shot diagnostics for the Nightscout connection used by the polling
//! agent, without touching Datadog.
//!
//! # Usage
//!
//! ```bash
//! ns2dd --help
//! ns2dd latest --base-url https://cgm.example.com --token SECRET
//! ```

#![deny(unsafe_code)]

use clap::{Args, Parser, Subcommand};
use shared::nightscout::{EntrySource, NightscoutClient};

/// Nightscout2Datadog CLI - inspect the upstream CGM feed
#[derive(Parser)]
#[command(name = "ns2dd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the most recent CGM entry
    Latest(LatestArgs),
}

#[derive(Args)]
struct LatestArgs {
    /// Nightscout base URL
    #[arg(long, env = "NIGHTSCOUT_BASE_URL")]
    base_url: String,

    /// Nightscout access token
    #[arg(long, env = "NIGHTSCOUT_TOKEN", hide_env_values = true)]
    token: String,

    /// Recency cutoff window in seconds
    #[arg(long, env = "NIGHTSCOUT_LOOKBACK_SECS", default_value_t = 120)]
    lookback_secs: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Latest(args)) => {
            let client = NightscoutClient::new(&args.base_url, args.token, args.lookback_secs)?;
            let entries = client.fetch_latest().await?;

            match entries.first() {
                None => println!(
                    "No entries within the last {} seconds",
                    args.lookback_secs
                ),
                Some(entry) => println!("{}", serde_json::to_string_pretty(entry)?),
            }
        }
        None => {
            println!("ns2dd v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
