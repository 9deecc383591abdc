//! The [`User`] participant record and its [`Status`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection status of a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Actively connected and recently active.
    Connected,
    /// No longer connected.
    Disconnected,
    /// Connection in an error state.
    Error,
    /// Connected but past the session's idle threshold without activity.
    Idle,
}

/// One participant in a session.
///
/// Exactly one user per session has `host == true`: whichever participant's
/// join observed an empty roster. The host is the authoritative writer of
/// persisted session state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable participant id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Avatar / profile URL.
    #[serde(default)]
    pub profile_url: String,
    /// Current connection status.
    pub status: Status,
    /// Caller-defined metadata.
    #[serde(default)]
    pub meta: HashMap<String, Value>,
    /// Unix seconds when the user joined the session.
    #[serde(default)]
    pub joined: i64,
    /// Unix seconds of the last observed activity.
    #[serde(default)]
    pub last_seen: i64,
    /// Whether this user is the session host.
    #[serde(default)]
    pub host: bool,
}

impl User {
    /// Create a user with the given id and name, disconnected until joined.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            profile_url: String::new(),
            status: Status::Disconnected,
            meta: HashMap::new(),
            joined: 0,
            last_seen: 0,
            host: false,
        }
    }

    /// Stamp this user as having joined now.
    pub fn mark_joined(&mut self, now: i64) {
        self.joined = now;
        self.last_seen = now;
        self.status = Status::Connected;
    }
}
