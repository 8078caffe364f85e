use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signup_guard::config::{GuardConfig, LogFormat, LoggingConfig};
use signup_guard::http::{extract_source_address, RateLimitResponse};
use signup_guard::ratelimit::{
    Clock, Identifiers, RateLimitCoordinator, Scope, SlidingWindowLimiter, SystemClock, UseCase,
};

/// Multi-scope rate limiting for signup and login endpoints.
#[derive(Debug, Parser)]
#[command(name = "signup-guard", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate one attempt and print the verdict with its HTTP mapping
    Check {
        /// signup or login
        #[arg(long)]
        use_case: UseCase,

        /// Email of the account being created or logged into
        #[arg(long)]
        email: String,

        /// Value of the X-Forwarded-For header
        #[arg(long)]
        forwarded_for: Option<String>,

        /// Value of the X-Real-IP header
        #[arg(long)]
        real_ip: Option<String>,

        /// Address of the direct connection
        #[arg(long)]
        peer: Option<IpAddr>,

        /// Evaluate the same attempt this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Delete the counters for one scope and identifier
    Reset {
        #[arg(long)]
        use_case: UseCase,

        /// global, ip or email
        #[arg(long)]
        scope: Scope,

        /// Address or email; ignored for the global scope
        #[arg(long, default_value = "")]
        identifier: String,
    },
    /// Print the resolved policy table
    Policies,
    /// Check that the counter store answers
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = GuardConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // A misconfigured policy table must stop the process here.
    let policies = Arc::new(config.policy_table()?);
    let store = config.build_store()?;
    info!(backend = ?config.store.backend, "Configuration loaded");

    match cli.command {
        Command::Check {
            use_case,
            email,
            forwarded_for,
            real_ip,
            peer,
            repeat,
        } => {
            let address =
                extract_source_address(forwarded_for.as_deref(), real_ip.as_deref(), peer)
                    .ok_or_else(|| anyhow!("no client address given"))?;
            let ids = Identifiers::new(&address, &email)?;

            let limiter = Arc::new(SlidingWindowLimiter::new(store, Arc::new(SystemClock)));
            let coordinator = RateLimitCoordinator::new(limiter.clone(), policies)
                .with_check_timeout(config.check_timeout());

            for _ in 0..repeat {
                let verdict = coordinator.check(use_case, &ids).await;
                let response = RateLimitResponse::from_verdict(&verdict, limiter.clock().now());
                println!(
                    "{}",
                    serde_json::to_string(&json!({
                        "verdict": verdict,
                        "response": response,
                    }))?
                );
            }
        }
        Command::Reset {
            use_case,
            scope,
            identifier,
        } => {
            let limiter = Arc::new(SlidingWindowLimiter::new(store, Arc::new(SystemClock)));
            let coordinator = RateLimitCoordinator::new(limiter, policies);
            coordinator.reset(use_case, scope, &identifier).await?;
            println!("reset {}/{}", use_case, scope);
        }
        Command::Policies => {
            let rows: Vec<_> = policies
                .iter()
                .map(|(use_case, scope, policy)| {
                    json!({
                        "use_case": use_case,
                        "scope": scope,
                        "limit": policy.limit,
                        "window_secs": policy.window.as_secs(),
                        "key_prefix": policy.key_prefix,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Ping => {
            store.ping().await?;
            println!("PONG");
        }
    }

    Ok(())
}

/// Initialize tracing. Logs go to stderr so stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
