//! Sanitation publisher - Main Entry Point
//!
//! Publishes each spreadsheet row to the broker, then clears the remote table.

use clap::{Parser, Subcommand};
use sanitation_publisher::config::PublisherConfig;
use sanitation_publisher::observability::init_default_logging;
use sanitation_publisher::publisher::{Publisher, PublisherSettings, RunOutcome};
use sanitation_publisher::source::SpreadsheetLoader;
use sanitation_publisher::table::DynamoTable;
use sanitation_publisher::transport::mqtt::MqttClient;
use std::path::PathBuf;
use std::process;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Publish sanitation inspection rows over MQTT
#[derive(Parser)]
#[command(name = "sanitation-publisher")]
#[command(about = "Publish spreadsheet rows to AWS IoT, then clear the results table")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every row, wait, then clear the remote table
    Run,
    /// Load the spreadsheet and encode every image without connecting
    Check,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Credentials may live in a local .env file
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }

    init_default_logging(cli.verbose);

    info!(
        "Starting sanitation publisher v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_publisher(config).await,
        Commands::Check => check_inputs(config),
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<PublisherConfig, Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            PublisherConfig::load_from_file(path)?
        }
        None => {
            let default_paths = ["publisher.toml", "config/publisher.toml"];

            match default_paths
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
            {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    PublisherConfig::load_from_file(&path)?
                }
                None => {
                    info!("No configuration file found, using built-in defaults");
                    PublisherConfig::default()
                }
            }
        }
    };

    config.validate()?;
    Ok(config)
}

/// Type of the production pipeline
type ProductionPublisher = Publisher<SpreadsheetLoader, MqttClient, DynamoTable>;

fn build_publisher(config: &PublisherConfig) -> Result<ProductionPublisher, Box<dyn std::error::Error>> {
    let transport = MqttClient::new(config.broker.clone(), config.tls.clone())?;
    let table = DynamoTable::from_env(&config.table);

    Ok(Publisher::new(
        SpreadsheetLoader::new(),
        transport,
        table,
        PublisherSettings::from_config(config),
    ))
}

async fn run_publisher(config: PublisherConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut publisher = build_publisher(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("Stopped sending data.");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Signal handling unavailable: {}", e),
        }
    });

    let outcome = publisher.run(shutdown_rx).await;
    signal_task.abort();

    match outcome? {
        RunOutcome::Completed { published, cleared } => {
            info!(published, cleared, "All rows published and remote table cleared");
        }
        RunOutcome::Interrupted { published } => {
            info!(published, "Interrupted, remote table left untouched");
        }
    }
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM. Later signals are absorbed by
/// tokio's handler, so a delete that already started runs to completion.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down gracefully...");
    Ok(())
}

fn check_inputs(config: PublisherConfig) -> Result<(), Box<dyn std::error::Error>> {
    let publisher = build_publisher(&config)?;
    let report = publisher.check()?;

    println!(
        "{} records ready, {} payload bytes total",
        report.records, report.payload_bytes
    );
    info!(records = report.records, "Input check complete");
    Ok(())
}

fn handle_config_command(
    config: PublisherConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
