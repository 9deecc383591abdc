//! The [`Event`] struct — the wire-level unit of communication.
//!
//! Events are a flat envelope with routing fields at the top level and a
//! `data` payload stored as opaque [`serde_json::Value`]. All routing
//! decisions (addressing, suppression, remote marking) operate on the
//! envelope without deserializing `data`.
//!
//! Typed access to the payload is opt-in via [`Event::typed_payload()`],
//! which deserializes into the type implied by [`EventType`] — a
//! `UserJoined` event carries a serialized [`crate::User`], a `General`
//! event carries caller-defined content.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventError;

/// Discriminates what an event's `data` payload means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// A participant joined the session; payload is the joining `User`.
    UserJoined,
    /// A participant left the session; payload is the departing `User`.
    UserLeft,
    /// A participant's record changed (status, meta); payload is the `User`.
    UserDataChanged,
    /// Application-defined content; appended to session history.
    General,
}

/// One wire-level message frame, in both directions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Id of the sending participant. Filled in by the coordinator when
    /// empty at send time.
    #[serde(default)]
    pub sender_id: String,
    /// Target participant id. Empty means broadcast to the whole session.
    #[serde(default)]
    pub receiver_id: String,
    /// Payload discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Opaque serialized payload (`Null` = empty).
    #[serde(default)]
    pub data: Value,
    /// Free-form text accompanying the event.
    #[serde(default)]
    pub message: String,
    /// True iff this event arrived from the bus rather than the local
    /// connection. Prevents re-broadcast loops.
    #[serde(default)]
    pub remote: bool,
}

impl Event {
    /// Create an empty event of the given type.
    pub fn new(event_type: EventType) -> Self {
        Self {
            sender_id: String::new(),
            receiver_id: String::new(),
            event_type,
            data: Value::Null,
            message: String::new(),
            remote: false,
        }
    }

    /// Create an event carrying a serialized payload.
    pub fn with_payload<T: Serialize>(
        event_type: EventType,
        payload: &T,
    ) -> Result<Self, EventError> {
        let mut event = Self::new(event_type);
        event.set(payload)?;
        Ok(event)
    }

    /// Serialize `payload` into this event's `data`.
    pub fn set<T: Serialize>(&mut self, payload: &T) -> Result<(), EventError> {
        self.data = serde_json::to_value(payload).map_err(EventError::Encode)?;
        Ok(())
    }

    /// Deserialize `data` into `T`.
    ///
    /// Fails with [`EventError::EmptyPayload`] when `data` is `Null` and
    /// [`EventError::Decode`] on malformed content.
    pub fn typed_payload<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        if self.data.is_null() {
            return Err(EventError::EmptyPayload);
        }
        serde_json::from_value(self.data.clone()).map_err(EventError::Decode)
    }

    /// Whether this event is addressed to everyone in the session.
    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_empty()
    }

    /// Whether this event should be delivered to the participant with `id`.
    ///
    /// Point-to-point addressing over a broadcast-capable bus: a non-empty
    /// `receiver_id` restricts delivery to that participant only.
    pub fn addressed_to(&self, id: &str) -> bool {
        self.receiver_id.is_empty() || self.receiver_id == id
    }
}
