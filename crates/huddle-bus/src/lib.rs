//! # huddle-bus
//!
//! The [`MessageBus`] capability contract and its two in-process
//! realizations:
//!
//! - [`PubSubBus`] — fire-and-forget fan-out. No delivery guarantee, no
//!   replay; every live subscriber receives every message.
//! - [`StreamBus`] — durable consumer-group log. Messages persist in a
//!   per-topic log; each named group tracks an independent read cursor
//!   starting at the log tail; consumers within one group share load while
//!   every group still sees every message.
//!
//! The relay core consumes only the capability set — produce-to-topic,
//! subscribe-from-topic, close — and must behave identically over either
//! realization. Both ends are bounded `tokio::mpsc` channels; the medium
//! side is bridged by forwarder tasks scoped to a per-handle cancellation
//! token, so closing one connection's handle never disturbs the shared
//! medium or other handles.

#![deny(unsafe_code)]

pub mod pubsub;
pub mod stream;

use async_trait::async_trait;
use tokio::sync::mpsc;

use huddle_core::Event;

pub use pubsub::PubSubBus;
pub use stream::StreamBus;

/// Prefix for per-session topics.
pub const TOPIC_PREFIX: &str = "session:";

/// Build the bus topic for a session id (`session:<id>`).
pub fn session_topic(session_id: &str) -> String {
    format!("{TOPIC_PREFIX}{session_id}")
}

/// A named-topic publish/subscribe or durable-stream abstraction.
///
/// One handle per connection: [`MessageBus::handle`] yields an independent
/// handle over the same shared medium, and [`MessageBus::close`] tears down
/// only that handle's producer/subscriber bridges.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Open a produce sink for `topic`. Events sent into the returned
    /// channel are forwarded onto the shared medium in FIFO order.
    async fn produce(&self, topic: &str) -> mpsc::Sender<Event>;

    /// Open a subscribe source for `topic`. The returned channel yields
    /// events from the shared medium in FIFO order.
    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event>;

    /// A fresh handle over the same medium for another connection.
    fn handle(&self) -> std::sync::Arc<dyn MessageBus>;

    /// Close this handle: all sinks and sources it opened stop forwarding.
    async fn close(&self);
}
