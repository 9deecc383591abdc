//! # huddle-session
//!
//! The relay core: the session coordinator and the per-connection task
//! orchestration.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `coordinator` | Session state machine: init (join-or-create), send, process, disconnect |
//! | `orchestrator` | Four concurrent tasks per connection under one cancellation scope |
//! | `wire` | Frame-level connection abstraction (one JSON event per frame) |
//! | `config` | Per-connection relay configuration (buffers, origin policy) |
//!
//! ## Data Flow
//!
//! wire reader → `coordinator.process_event` → `coordinator.send_event` →
//! bus produce sink; bus subscribe source → addressing filter →
//! `process_event` → outbound buffer → wire writer.

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod orchestrator;
pub mod wire;

pub use config::{OriginPolicy, RelayConfig};
pub use coordinator::SessionCoordinator;
pub use orchestrator::{run_connection, ConnectionContext, DeliveryHook};
pub use wire::{EventSink, EventStream};
