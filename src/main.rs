use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexware_ratelimit::config::LexwareConfig;
use lexware_ratelimit::ratelimit::{normalize_endpoint, LexwareRateLimiter, LimitType};
use lexware_ratelimit::store::MemoryStore;

/// Inspect and exercise the Lexware API client rate limiter.
#[derive(Debug, Parser)]
#[command(name = "lexware-ratelimit", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "LEXWARE_RATELIMIT_CONFIG")]
    config: Option<PathBuf>,

    /// Connection identifier (overrides configuration)
    #[arg(long)]
    connection_id: Option<String>,

    /// Client identifier (overrides configuration)
    #[arg(long)]
    client_id: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the normalized endpoint and the bucket keys it maps to
    Normalize {
        endpoint: String,
    },
    /// Send a series of requests through an in-memory limiter and print each decision
    Simulate {
        endpoint: String,

        /// Number of requests to attempt
        #[arg(short = 'n', long, default_value_t = 10)]
        requests: u32,

        /// Delay between requests in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Print the bucket status for an endpoint on a fresh in-memory store
    Status {
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = LexwareConfig::load(cli.config.as_deref())?;
    let connection_id = cli
        .connection_id
        .unwrap_or_else(|| config.identity.connection_id.clone());
    let client_id = cli
        .client_id
        .unwrap_or_else(|| config.identity.client_id.clone());
    info!(
        connection_id = %connection_id,
        client_id = %client_id,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let limiter =
        LexwareRateLimiter::from_config(connection_id, client_id, store, &config.rate_limiting)?;

    match cli.command {
        Command::Normalize { endpoint } => {
            let report = json!({
                "endpoint": endpoint,
                "normalized": normalize_endpoint(&endpoint),
                "connection_key": limiter.bucket_key(LimitType::Connection, &endpoint).to_store_key(),
                "client_key": limiter.bucket_key(LimitType::Client, &endpoint).to_store_key(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Simulate {
            endpoint,
            requests,
            interval_ms,
        } => {
            simulate(&limiter, &endpoint, requests, Duration::from_millis(interval_ms)).await?;
        }
        Command::Status { endpoint } => {
            let status = limiter.get_status(&endpoint).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Check-then-commit each request the way the API client does, printing one
/// JSON line per decision followed by the final bucket status.
async fn simulate(
    limiter: &LexwareRateLimiter,
    endpoint: &str,
    requests: u32,
    interval: Duration,
) -> anyhow::Result<()> {
    let mut allowed = 0u32;

    for request in 1..=requests {
        let decision = limiter.is_allowed(endpoint).await;
        if decision.allowed {
            limiter.record_hit(endpoint).await;
            allowed += 1;
        }
        println!(
            "{}",
            serde_json::to_string(&json!({ "request": request, "decision": decision }))?
        );

        if !interval.is_zero() && request < requests {
            tokio::time::sleep(interval).await;
        }
    }

    info!(requests, allowed, denied = requests - allowed, "Simulation finished");
    let status = limiter.get_status(endpoint).await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
