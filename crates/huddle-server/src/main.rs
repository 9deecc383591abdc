//! Relay server binary — wires store, bus, and HTTP endpoint together.

#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use huddle_bus::{MessageBus, PubSubBus, StreamBus};
use huddle_server::{metrics, RelayServer, ServerConfig};
use huddle_store::MemoryStore;

/// Multi-user session relay server.
#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Multi-user session relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Maximum concurrent connections (0 for unlimited).
    #[arg(long, default_value = "0")]
    max_connections: usize,

    /// Message bus realization.
    #[arg(long, value_enum, default_value_t = BusKind::Pubsub)]
    bus: BusKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BusKind {
    /// Fire-and-forget broadcast.
    Pubsub,
    /// Durable consumer-group stream.
    Stream,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections,
        ..ServerConfig::default()
    };

    let prometheus = metrics::install_recorder();

    let store = Arc::new(MemoryStore::new());
    let bus: Arc<dyn MessageBus> = match args.bus {
        BusKind::Pubsub => Arc::new(PubSubBus::new(config.relay.read_buffer_size)),
        BusKind::Stream => Arc::new(StreamBus::new(config.relay.read_buffer_size)),
    };

    let server = RelayServer::new(config, store, bus).with_metrics(prometheus);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server
        .shutdown()
        .graceful_shutdown(Some(Duration::from_secs(10)))
        .await;
    let _ = handle.await;

    tracing::info!("shutdown complete");
    Ok(())
}
