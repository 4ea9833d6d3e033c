//! habridge - Main Entry Point
//!
//! Wires configuration, modules, discovery, transport and the sync engine
//! together, and owns signal handling so every exit path closes pollers and
//! disconnects from the broker cleanly.

use clap::{Parser, Subcommand};
use habridge::config::BridgeConfig;
use habridge::discovery::Discovery;
use habridge::module::{Module, ModuleRegistry, StatusModule};
use habridge::observability::init_default_logging;
use habridge::sync::{SyncEngine, SyncSettings};
use habridge::transport::mqtt::MqttClient;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// MQTT sensor bridge with Home Assistant discovery
#[derive(Parser)]
#[command(name = "habridge")]
#[command(about = "MQTT sensor bridge with Home Assistant discovery")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Run,
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

    init_default_logging();

    info!("Starting habridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Bridge shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BridgeConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = vec!["habridge.toml", "config/habridge.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(BridgeConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create habridge.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    // The root module publishes on the base topic itself; configured sensor
    // modules follow in listed order
    let mut modules: Vec<(String, Box<dyn Module>)> =
        vec![(String::new(), Box::new(StatusModule::new()))];
    modules.extend(ModuleRegistry::builtin().resolve(&config)?);

    // Built once per process start; MAC and node identity do not change at
    // runtime. Fatal if discovery is enabled but no MAC resolves.
    let discovery = Discovery::build(
        &config.homeassistant.discovery,
        &modules,
        &config.mqtt.base_topic,
    )?;

    let mut client = MqttClient::new(&config.mqtt)?;
    let connected_rx = client
        .take_connection_events()
        .ok_or("connection events already taken")?;

    let settings = SyncSettings {
        base_topic: config.mqtt.base_topic.clone(),
        birth_topic: config.homeassistant.birth_message_topic.clone(),
        settle_delay: config.settle_delay(),
        min_resync_interval: config.min_resync_interval(),
    };

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    // Block until the first session; a signal here aborts startup cleanly
    let connected = tokio::select! {
        result = client.connect() => {
            result?;
            true
        }
        _ = sigint.recv() => false,
        _ = sigterm.recv() => false,
    };

    let client = Arc::new(client);
    let mut engine = SyncEngine::new(client.clone(), modules, discovery, settings);

    if connected {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!("Bridge is running");

        tokio::select! {
            _ = engine.run(connected_rx, shutdown_rx) => {
                error!("Sync engine stopped unexpectedly");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
        let _ = shutdown_tx.send(true);
    } else {
        info!("Received shutdown signal during startup");
    }

    // Cleanup runs on every exit path: pollers first, then the broker
    // session (the last will stays with the broker for ungraceful exits)
    engine.close_modules().await;
    client.disconnect().await?;
    Ok(())
}

fn handle_config_command(
    config: BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
