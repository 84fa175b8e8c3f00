//! mysql-mirror CLI - scheduled one-way MySQL replication host.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mysql_mirror::{db, AppConfig, SyncEngine, SyncError};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mysql-mirror")]
#[command(about = "Scheduled one-way MySQL replication")]
#[command(version)]
struct Cli {
    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start replication and run until interrupted
    Run,

    /// Run a single schema reconciliation pass and exit
    SchemaSync,

    /// Test connectivity to both databases
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);

    let config = AppConfig::from_env()?;

    // both pools are pinged during construction
    let source = db::connect(&config.source, "source").await?;
    let target = db::connect(&config.target, "target").await?;

    match cli.command {
        Commands::Run => {
            let engine = SyncEngine::new(source.clone(), target.clone(), config.sync);
            engine.start_sync().await?;

            wait_for_shutdown().await;

            engine.stop_sync().await?;
            let status = engine.get_status();
            info!(
                "Final status:\n{}",
                serde_json::to_string_pretty(&status).unwrap_or_default()
            );
        }

        Commands::SchemaSync => {
            let engine = SyncEngine::new(source.clone(), target.clone(), config.sync);
            engine.trigger_schema_sync().await?;
            println!("Schema synchronization completed");
        }

        Commands::HealthCheck => {
            println!("Source: OK");
            println!("Target: OK");
        }
    }

    source.close().await;
    target.close().await;
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Block until SIGINT or SIGTERM arrives.
#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down gracefully");
    }
}
