//! huginn: command-line front end for the resilient API client
//!
//! Sends one request through the full cache / rate-limit / breaker / retry
//! stack, checks API health, or inspects the effective configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use huginn::{ClientConfig, Huginn};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Resilient client for remote inference APIs")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// POST a JSON payload to an endpoint
    Post {
        /// Endpoint path, appended to the base URL (e.g. /chat/completions)
        endpoint: String,
        /// JSON payload (or omit to read from stdin)
        payload: Option<String>,
        /// Label used in logs and metrics
        #[arg(short, long, default_value = "request")]
        operation: String,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
        /// Print request statistics after the response
        #[arg(long)]
        stats: bool,
    },

    /// Check the API and report its health
    Health,

    /// Remove every cached response
    ClearCache,

    /// Print the effective configuration (API key omitted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::load_or_default(args.config.as_deref())?.apply_env()?;

    if let Command::Config = args.command {
        config.validate()?;
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let client = Huginn::builder().config(config).build()?;

    match args.command {
        Command::Post {
            endpoint,
            payload,
            operation,
            no_cache,
            stats,
        } => {
            let payload = resolve_payload(payload)?;
            let payload: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| format!("post: payload is not valid JSON: {e}"))?;
            let response = client
                .execute(&endpoint, &payload, &operation, !no_cache)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if stats {
                eprintln!("{}", serde_json::to_string_pretty(&client.metrics())?);
            }
        }

        Command::Health => {
            let report = client.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::ClearCache => match client.cache() {
            Some(cache) => {
                let removed = cache.len().await;
                client.clear_cache().await;
                println!("removed {removed} cached responses from {}", cache.dir().display());
            }
            None => println!("cache disabled"),
        },

        Command::Config => unreachable!("handled above"),
    }

    Ok(())
}

/// Resolve the payload from the CLI argument, falling back to piped stdin.
fn resolve_payload(arg: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(payload) = arg {
        return Ok(payload);
    }
    if io::stdin().is_terminal() {
        return Err("post: no payload provided (pass JSON as argument or via stdin)".into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        Err("post: empty payload on stdin".into())
    } else {
        Ok(trimmed.to_string())
    }
}
