//! Error hierarchy for the Huddle relay.
//!
//! Built on [`thiserror`]:
//!
//! - [`EventError`]: payload codec failures (encode, decode, empty payload)
//! - [`StoreError`]: session store read/write failures
//! - [`SessionError`]: coordinator lifecycle failures (init paths)
//! - [`WireError`]: connection-level I/O failures (fatal to the connection)
//!
//! Channel-full conditions are deliberately absent: a full buffer is logged
//! and the event dropped, never surfaced to callers.

use thiserror::Error;

/// Event payload codec error.
#[derive(Debug, Error)]
pub enum EventError {
    /// `typed_payload` called on an event whose `data` is empty.
    #[error("event payload is empty")]
    EmptyPayload,

    /// Payload could not be serialized into the envelope.
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Payload could not be deserialized into the requested type.
    #[error("failed to decode event payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Session store error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry for the requested key (or the entry expired).
    #[error("session not found")]
    NotFound,

    /// Backend read/write failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Session coordinator lifecycle error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `init` was called twice on the same coordinator.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// Store failure on the create/join path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payload codec failure while building a lifecycle event.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Wire connection error.
///
/// The only steady-state error class that is fatal to a connection.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// A frame could not be decoded as an event.
    #[error("malformed frame: {0}")]
    Protocol(String),

    /// Underlying transport failure.
    #[error("wire I/O error: {0}")]
    Io(String),
}
