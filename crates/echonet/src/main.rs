//! echonet
//!
//! Command line front end: discover appliances or monitor configured ones.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use echonet::discovery::discovery_key;
use echonet::{ChannelListener, DeviceEvent, Engine, EngineConfig, PropertyRegistry};

/// ECHONET Lite controller
#[derive(Parser, Debug)]
#[command(name = "echonet")]
#[command(about = "ECHONET Lite discovery and monitoring", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON instead of text
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the network and report devices as they initialise
    Discover {
        /// How long to listen before exiting
        #[arg(long, default_value = "30")]
        seconds: u64,
    },
    /// Poll configured devices until interrupted
    Monitor {
        /// Also register devices found on the network
        #[arg(long)]
        discover: bool,
    },
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echonet=info")))
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();
    info!("Starting echonet v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load(args.config.as_deref())?;
    let registry = Arc::new(PropertyRegistry::new());
    let engine = Engine::spawn(&config, registry)?;
    let handle = engine.handle();

    let (tx, rx) = mpsc::channel::<DeviceEvent>();
    let discovery_listener = Arc::new(ChannelListener::new(discovery_key(), tx.clone()));

    let limit = match args.command {
        Command::Discover { seconds } => {
            handle.start_discovery(discovery_listener)?;
            Some(Duration::from_secs(seconds))
        }
        Command::Monitor { discover } => {
            let defaults = config.device_settings();
            for entry in &config.devices {
                let key = entry.key();
                handle.register_with(
                    key,
                    Box::new(ChannelListener::new(key, tx.clone())),
                    entry.settings(defaults),
                )?;
            }
            info!("Monitoring {} configured devices", config.devices.len());
            if discover {
                handle.start_discovery(discovery_listener)?;
            }
            None
        }
    };
    drop(tx);

    // Bridge events from the reactor into the async world
    let json = args.json;
    let printer = tokio::task::spawn_blocking(move || {
        while let Ok(event) = rx.recv() {
            print_event(&event, json);
        }
    });

    match limit {
        Some(limit) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                _ = tokio::time::sleep(limit) => info!("Discovery window closed"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    printer.await?;
    info!("Shutdown complete");
    Ok(())
}

fn print_event(event: &DeviceEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialise event: {}", e),
        }
        return;
    }

    match event {
        DeviceEvent::DeviceFound { key, identifier, class, .. } => {
            println!("found       {} {} ({})", key, class, identifier)
        }
        DeviceEvent::Initialised { key, identifier, channels, .. } => {
            println!("initialised {} {} [{}]", key, identifier, channels.join(", "))
        }
        DeviceEvent::Updated { key, channel, state, .. } => println!("updated     {} {} = {}", key, channel, state),
        DeviceEvent::Offline { key, .. } => println!("offline     {}", key),
        DeviceEvent::Removed { key, .. } => println!("removed     {}", key),
    }
}
