//! mass-compress - Background Video Compression Daemon
//!
//! Entry point: parses flags, initializes logging, loads configuration and
//! wires the queue, the worker loop, the signal watcher and the TCP control
//! channel together.

use anyhow::{Result, bail};
use clap::Parser;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mass_compress::cli::Args;
use mass_compress::config::Config;
use mass_compress::control::ControlState;
use mass_compress::queue::JobQueue;
use mass_compress::server;
use mass_compress::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    if !(1..=10).contains(&args.threads) {
        bail!("number of threads must be between 1 and 10");
    }

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    let queue = Arc::new(JobQueue::new());
    let control = Arc::new(ControlState::new(args.threads));

    // OS interrupts feed the same two-stage shutdown as the stop command
    server::spawn_signal_watcher(control.clone());

    // The single sequential worker draining the queue
    let worker = Worker::new(queue.clone(), control.clone(), config.clone(), args.tmpdir);
    tokio::spawn(async move { worker.run().await });

    // Binding failure terminates the process immediately
    server::run(config.server.port, queue, control).await?;

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".mass-compress").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "mass-compress.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("mass-compress.log").display()
    );

    Ok(())
}
