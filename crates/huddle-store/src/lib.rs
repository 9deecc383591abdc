//! # huddle-store
//!
//! The [`SessionStore`] contract — a get/set cache keyed by session id with
//! expiring entries — plus [`MemoryStore`], the in-process TTL realization
//! used by tests and the demo binary.
//!
//! The store is an external collaborator from the relay core's point of
//! view: the coordinator only ever calls `get` and `set`, and relies on the
//! host-only persistence rule to avoid write conflicts. Eviction beyond TTL
//! expiry is the backend's business.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use huddle_core::{Session, StoreError};

/// Get/set cache for persisted session state.
///
/// Values expire after the TTL supplied at write time; a `get` of an
/// expired entry fails with [`StoreError::NotFound`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session record by key.
    async fn get(&self, key: &str) -> Result<Session, StoreError>;

    /// Write a session record with the given time-to-live.
    async fn set(&self, key: &str, session: &Session, ttl: Duration) -> Result<(), StoreError>;
}

/// In-memory TTL map realization of [`SessionStore`].
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Session, Instant)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Session, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((session, deadline)) if *deadline > Instant::now() => Ok(session.clone()),
            Some(_) => {
                // Lazy eviction on read.
                let _ = entries.remove(key);
                debug!(key, "store entry expired");
                Err(StoreError::NotFound)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn set(&self, key: &str, session: &Session, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // Writes double as the sweep point, so entries whose keys are never
        // read again cannot accumulate.
        entries.retain(|_, (_, deadline)| *deadline > now);
        let _ = entries.insert(key.to_string(), (session.clone(), now + ttl));
        Ok(())
    }
}
