//! Frame-level connection abstraction.
//!
//! The orchestrator reads and writes one JSON-encoded [`Event`] per
//! application frame; everything below that (WebSocket framing, the
//! upgrade handshake) belongs to the transport adapter. The two halves are
//! separate traits so they can live on different tasks.
//!
//! [`mem`] provides an in-process wire used by tests and embedded callers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use huddle_core::{Event, WireError};

/// Write half of a connection.
#[async_trait]
pub trait EventSink: Send {
    /// Write one event as one frame.
    async fn send(&mut self, event: &Event) -> Result<(), WireError>;
}

/// Read half of a connection.
#[async_trait]
pub trait EventStream: Send {
    /// Read one frame.
    ///
    /// `None` means the peer closed cleanly. `Some(Err(Protocol(_)))` is a
    /// malformed frame — recoverable, the stream keeps yielding. Any other
    /// error is fatal to the connection.
    async fn recv(&mut self) -> Option<Result<Event, WireError>>;
}

/// In-process wire: a pair of channels standing in for a real connection.
pub mod mem {
    use super::{async_trait, mpsc, Event, EventSink, EventStream, WireError};

    /// Write half handed to the orchestrator.
    pub struct MemSink {
        tx: mpsc::UnboundedSender<Event>,
    }

    /// Read half handed to the orchestrator.
    pub struct MemStream {
        rx: mpsc::UnboundedReceiver<Result<Event, WireError>>,
    }

    /// The far side of the wire, held by the test or embedded peer.
    pub struct Peer {
        /// Frames the orchestrator wrote.
        pub outbound: mpsc::UnboundedReceiver<Event>,
        /// Frames to feed the orchestrator's reader.
        pub inbound: mpsc::UnboundedSender<Result<Event, WireError>>,
    }

    /// Create a connected in-process wire.
    pub fn wire() -> (MemSink, MemStream, Peer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            MemSink { tx: out_tx },
            MemStream { rx: in_rx },
            Peer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    #[async_trait]
    impl EventSink for MemSink {
        async fn send(&mut self, event: &Event) -> Result<(), WireError> {
            self.tx.send(event.clone()).map_err(|_| WireError::Closed)
        }
    }

    #[async_trait]
    impl EventStream for MemStream {
        async fn recv(&mut self) -> Option<Result<Event, WireError>> {
            self.rx.recv().await
        }
    }
}
