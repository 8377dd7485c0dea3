//! Director Daemon
//!
//! Keeps OBS on the scene that matches the live judging state.
//!
//! # Usage
//!
//! ```bash
//! # Start with ~/.config/director/director.toml
//! director-daemon
//!
//! # Explicit config file
//! director-daemon --config /etc/director/director.toml
//!
//! # Validate the configuration and print the rules
//! director-daemon --config director.toml --check
//!
//! # Verbose logging with every frame
//! RUST_LOG=debug director-daemon --log-frames
//! ```
//!
//! # Environment Variables
//!
//! - `DIRECTOR_CONFIG`: Configuration file path
//! - `DIRECTOR_DEVICE_URL`, `DIRECTOR_DEVICE_PASSWORD`: OBS endpoint
//! - `DIRECTOR_STREAM_URL`, `DIRECTOR_STREAM_FILTER`: judging feed
//! - `DIRECTOR_OVERLAY_URL`: snapshot relay endpoint
//! - `RUST_LOG`: Log filter
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use director_core::config::load_config_with_env;
use director_core::{ConfigOverrides, Director, DirectorConfig, RuleEngine};

/// Director Daemon - automatic scene switching for live judging
#[derive(Parser, Debug)]
#[command(name = "director-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "DIRECTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every transport frame at debug level
    #[arg(long)]
    log_frames: bool,

    /// Validate the configuration, print the rules and exit
    #[arg(long)]
    check: bool,
}

/// Initialize logging
fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("director_daemon=info".parse()?)
                .add_directive("director_core=info".parse()?),
        )
        .with_target(true)
        .init();
    Ok(())
}

/// Load, override and validate the configuration
fn resolve_config<F>(args: &Args, lookup: F) -> Result<DirectorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let path = match &args.config {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file {} does not exist", path.display())
        }
        Some(path) => Some(path.clone()),
        None => director_core::default_config_path(),
    };

    let mut config = load_config_with_env(path, lookup).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if args.log_frames {
        overrides = overrides.with_log_frames(true);
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// One line per rule, in evaluation order
fn describe_rules(config: &DirectorConfig) -> Vec<String> {
    RuleEngine::from_specs(config.rules.clone())
        .rules()
        .iter()
        .map(|rule| format!("{} -> {}", rule.name(), rule.action()))
        .collect()
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, shutting down");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = resolve_config(&args, |key| std::env::var(key).ok())?;

    if args.check {
        println!("Configuration OK ({})", config.source());
        for line in describe_rules(&config) {
            println!("  {line}");
        }
        return Ok(());
    }

    info!("Director daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = config.config_file_path() {
        info!(config_path = %path.display(), "Config file");
    }
    if config.rules.is_empty() {
        warn!("No rules configured, the scene will never change");
    }

    let director = Director::start(&config)?;
    shutdown_signal().await?;
    director.shutdown();

    info!("Director daemon stopped cleanly");
    Ok(())
}
