//! The [`Session`] record — the shared state persisted by the host.
//!
//! The local participant record (the "self" user of one connection) is
//! deliberately not part of this struct: it lives in the coordinator and is
//! never serialized to the shared store.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::user::User;

/// Default bound on the session history.
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Default idle threshold in seconds.
pub const DEFAULT_IDLE_SECS: u64 = 60;

/// Suffix appended to the session id to form the store key.
pub const STORE_KEY_SUFFIX: &str = "_session_info";

/// Shared state for one multi-party interaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable session identifier.
    pub id: String,
    /// Roster in join order.
    #[serde(default)]
    pub users: Vec<User>,
    /// Bounded event history, oldest first.
    #[serde(default)]
    pub history: Vec<Event>,
    /// Cap on `history`; oldest entries are evicted beyond it.
    pub max_history: usize,
    /// Seconds of inactivity before a participant is marked idle.
    #[serde(rename = "idleDuration")]
    pub idle_duration_secs: u64,
    /// Caller-defined session metadata.
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Session {
    /// Create a fresh session with default bounds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            users: Vec::new(),
            history: Vec::new(),
            max_history: DEFAULT_MAX_HISTORY,
            idle_duration_secs: DEFAULT_IDLE_SECS,
            meta: HashMap::new(),
        }
    }

    /// The store key for this session.
    pub fn store_key(&self) -> String {
        store_key(&self.id)
    }

    /// Idle threshold as a [`Duration`].
    pub fn idle_duration(&self) -> Duration {
        Duration::from_secs(self.idle_duration_secs)
    }

    /// Append an event to the history, evicting the oldest entries beyond
    /// `max_history` (first-in-first-out).
    pub fn push_history(&mut self, event: Event) {
        self.history.push(event);
        while self.history.len() > self.max_history {
            let _ = self.history.remove(0);
        }
    }

    /// The roster entry with the oldest `joined` stamp, ties broken by
    /// roster order. Used for host reassignment when the host departs.
    pub fn oldest_user(&self) -> Option<&User> {
        self.users.iter().min_by_key(|u| u.joined)
    }
}

/// Build the store key for a session id (`<id>_session_info`).
pub fn store_key(session_id: &str) -> String {
    format!("{session_id}{STORE_KEY_SUFFIX}")
}
