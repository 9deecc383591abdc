//! # huddle-server
//!
//! Axum HTTP + `WebSocket` relay endpoint.
//!
//! - `/ws`: upgrade handshake (origin + capacity admission), one
//!   orchestrated connection per socket
//! - `/health`: liveness and connection count
//! - `/metrics`: Prometheus text exposition
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
