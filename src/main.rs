//! FCS feed client - command line entry point
//!
//! Streams market data for the requested subscriptions to stdout, one JSON
//! message per line. SIGUSR1 and SIGUSR2 stand in for the host application
//! going to the background and coming back.

use clap::{Parser, Subcommand};
use fcs_feed::config::FeedConfig;
use fcs_feed::observability::init_default_logging;
use fcs_feed::session::{FeedClient, SessionObserver};
use fcs_feed::transport::{CloseInfo, TransportError};
use serde_json::Value;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Real-time market data feed client
#[derive(Parser)]
#[command(name = "fcs-feed")]
#[command(about = "Stream real-time market data from the FCS WebSocket feed")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key, overrides the configuration file
    #[arg(long, env = "FCS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print incoming messages
    Stream {
        /// Feed to join as SYMBOL@TIMEFRAME, e.g. BINANCE:BTCUSDT@1m
        #[arg(short, long = "subscribe", value_name = "SYMBOL@TIMEFRAME", value_parser = parse_subscription)]
        subscriptions: Vec<(String, String)>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn parse_subscription(value: &str) -> Result<(String, String), String> {
    match value.rsplit_once('@') {
        Some((symbol, timeframe)) if !symbol.is_empty() && !timeframe.is_empty() => {
            Ok((symbol.to_string(), timeframe.to_string()))
        }
        _ => Err(format!(
            "expected SYMBOL@TIMEFRAME (e.g. BINANCE:BTCUSDT@1m), got '{value}'"
        )),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting fcs-feed v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    if let Some(api_key) = cli.api_key {
        config.feed.api_key = Some(api_key);
    }

    let result = match cli.command {
        Commands::Stream { subscriptions } => run_stream(config, subscriptions).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<FeedConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(FeedConfig::load_from_file(path)?);
    }

    let default_paths = ["feed.toml", "config/feed.toml"];
    for path_str in default_paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(FeedConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(FeedConfig::default())
}

/// Prints messages to stdout and lifecycle events to the log
struct StdoutObserver;

impl SessionObserver for StdoutObserver {
    fn on_connected(&self) {
        info!("Connected to feed");
    }

    fn on_reconnected(&self) {
        info!("Reconnected to feed");
    }

    fn on_closed(&self, info: &CloseInfo) {
        info!(code = info.code, reason = %info.reason, "Feed connection closed");
    }

    fn on_message(&self, message: &Value) {
        println!("{message}");
    }

    fn on_error(&self, error: &TransportError) {
        warn!(error = %error, "Feed transport error");
    }
}

async fn run_stream(
    config: FeedConfig,
    subscriptions: Vec<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    if subscriptions.is_empty() {
        warn!("No subscriptions requested, only lifecycle events will be shown");
    }

    let client = FeedClient::new(config);
    client.add_observer(Arc::new(StdoutObserver))?;
    for (symbol, timeframe) in &subscriptions {
        client.join(symbol, timeframe)?;
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sigusr1 = signal::unix::signal(signal::unix::SignalKind::user_defined1())?;
    let mut sigusr2 = signal::unix::signal(signal::unix::SignalKind::user_defined2())?;

    tokio::select! {
        result = client.connect() => result?,
        _ = sigint.recv() => {
            info!("Received SIGINT before connecting, shutting down");
            client.shutdown().await;
            return Ok(());
        }
    }

    info!(
        subscriptions = subscriptions.len(),
        "Streaming; SIGUSR1 = background, SIGUSR2 = foreground, Ctrl-C to stop"
    );

    let mut status = client.watch_status();
    let mut exhausted = false;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = sigusr1.recv() => {
                info!("Received SIGUSR1, treating application as backgrounded");
                client.backgrounded();
            }
            _ = sigusr2.recv() => {
                info!("Received SIGUSR2, treating application as foregrounded");
                client.foregrounded();
            }
            _ = status.wait_for(|status| status.reconnect_exhausted) => {
                error!("Feed connection permanently lost, shutting down");
                exhausted = true;
                break;
            }
        }
    }

    client.disconnect();
    let metrics = client.metrics();
    info!(
        messages = metrics.messages_received,
        reconnects = metrics.reconnects_scheduled,
        "Session summary"
    );
    client.shutdown().await;

    if exhausted {
        return Err("reconnect attempts exhausted".into());
    }
    Ok(())
}

fn handle_config_command(
    config: &FeedConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
        let credential = if config.credential().is_some() {
            "configured"
        } else {
            "missing"
        };
        println!("# credential: {credential}");
    }

    info!("Configuration validation complete");
    Ok(())
}
