//! The session coordinator — one per connection.
//!
//! Owns the connection's view of a session (roster, bounded history, the
//! local participant record) and drives the lifecycle:
//! `init` (join-or-create) → `send_event` / `process_event` → `disconnect`.
//!
//! All session mutation funnels through one mutex, taken by whichever task
//! (bus listener, idle monitor, inbound reader) needs it; the lock is never
//! held across an await. Host persistence works on a snapshot cloned under
//! the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use huddle_bus::{session_topic, MessageBus};
use huddle_core::session::store_key;
use huddle_core::{Event, EventType, Session, SessionError, Status, StoreError, User};
use huddle_store::SessionStore;

/// TTL applied to every session record write.
pub const SESSION_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Events dropped because the bus produce sink was full or closed.
pub const RELAY_BUS_DROPS_TOTAL: &str = "relay_bus_drops_total";

/// Live session state behind the coordinator mutex.
struct Inner {
    session: Session,
    self_user: User,
}

/// Coordinates one participant's membership in a shared session.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn MessageBus>,
    state: Mutex<Option<Inner>>,
    produce: Mutex<Option<mpsc::Sender<Event>>>,
    last_event_sent: Mutex<Instant>,
    initialized: AtomicBool,
}

impl SessionCoordinator {
    /// Create an uninitialized coordinator over the given collaborators.
    ///
    /// `bus` should be a per-connection handle; `disconnect` closes it.
    pub fn new(store: Arc<dyn SessionStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            store,
            bus,
            state: Mutex::new(None),
            produce: Mutex::new(None),
            last_event_sent: Mutex::new(Instant::now()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Join `session_id` if the store knows it, create it otherwise.
    ///
    /// Returns the bus subscribe source for the session topic; the
    /// orchestrator's bus listener drains it. Fails with
    /// [`SessionError::AlreadyInitialized`] on a second call (state
    /// unchanged) and surfaces store failures on either path.
    pub async fn init(
        &self,
        session_id: &str,
        mut user: User,
    ) -> Result<mpsc::Receiver<Event>, SessionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyInitialized);
        }
        *self.last_event_sent.lock() = Instant::now();
        let key = store_key(session_id);
        let topic = session_topic(session_id);
        let now = Utc::now().timestamp();

        match self.store.get(&key).await {
            Ok(session) => {
                // Join path. Whoever observes an empty roster becomes host.
                user.host = session.users.is_empty();
                user.mark_joined(now);
                info!(session_id, user = %user.name, host = user.host, "joining session");

                let sink = self.bus.produce(&topic).await;
                let source = self.bus.subscribe(&topic).await;
                *self.produce.lock() = Some(sink);

                let join = Event::with_payload(EventType::UserJoined, &user)?;
                *self.state.lock() = Some(Inner {
                    session,
                    self_user: user,
                });
                // The joiner enters rosters (its own included) through this
                // broadcast coming back off the bus.
                self.send_event(join);
                Ok(source)
            }
            Err(StoreError::NotFound) => {
                // Create path. No peers exist yet, so no broadcast; the
                // creator lands in the persisted roster directly.
                user.host = true;
                user.mark_joined(now);
                let mut session = Session::new(session_id);
                session.users.push(user.clone());
                info!(session_id, user = %user.name, "creating session");

                self.store.set(&key, &session, SESSION_TTL).await?;

                let sink = self.bus.produce(&topic).await;
                let source = self.bus.subscribe(&topic).await;
                *self.produce.lock() = Some(sink);
                *self.state.lock() = Some(Inner {
                    session,
                    self_user: user,
                });
                Ok(source)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort publish onto the bus.
    ///
    /// Fills `sender_id` from the local participant when empty, stamps the
    /// activity clock, and try-sends: a full sink drops the event with a
    /// log line, never an error. A participant that was idle is flipped
    /// back to connected, with a best-effort `UserDataChanged` following
    /// the original event.
    pub fn send_event(&self, mut event: Event) {
        let woke = {
            let mut guard = self.state.lock();
            let Some(inner) = guard.as_mut() else { return };
            if event.sender_id.is_empty() {
                event.sender_id = inner.self_user.id.clone();
            }
            if inner.self_user.status == Status::Idle {
                inner.self_user.status = Status::Connected;
                inner.self_user.last_seen = Utc::now().timestamp();
                Some(inner.self_user.clone())
            } else {
                None
            }
        };
        *self.last_event_sent.lock() = Instant::now();
        self.emit(event);

        if let Some(user) = woke {
            debug!(user = %user.name, "active again, leaving idle");
            match Event::with_payload(EventType::UserDataChanged, &user) {
                Ok(mut notice) => {
                    notice.sender_id = user.id;
                    self.emit(notice);
                }
                Err(err) => warn!(error = %err, "failed to encode wake notification"),
            }
        }
    }

    /// Apply one event to local session state.
    ///
    /// Returns `true` (suppress) when the event must not be forwarded to
    /// the local connection: only for the uninitialized short-circuit and
    /// undecodable lifecycle payloads. The host re-persists the session
    /// (TTL reset) after every roster or history change; persistence
    /// failures here are logged, never surfaced.
    pub async fn process_event(&self, event: &Event) -> bool {
        let persist = {
            let mut guard = self.state.lock();
            let Some(inner) = guard.as_mut() else {
                return true;
            };
            match event.event_type {
                EventType::UserJoined => {
                    let user: User = match event.typed_payload() {
                        Ok(u) => u,
                        Err(err) => {
                            warn!(error = %err, "discarding join event with bad payload");
                            return true;
                        }
                    };
                    debug!(user = %user.name, "user joined");
                    inner.session.users.push(user);
                    host_snapshot(inner)
                }
                EventType::UserLeft => {
                    let user: User = match event.typed_payload() {
                        Ok(u) => u,
                        Err(err) => {
                            warn!(error = %err, "discarding leave event with bad payload");
                            return true;
                        }
                    };
                    let was_host = inner
                        .session
                        .users
                        .iter()
                        .find(|u| u.id == user.id)
                        .map_or(user.host, |u| u.host);
                    inner.session.users.retain(|u| u.id != user.id);
                    debug!(user = %user.name, was_host, "user left");
                    if was_host {
                        // Oldest remaining participant inherits the session.
                        let next_id = inner.session.oldest_user().map(|u| u.id.clone());
                        if let Some(id) = next_id {
                            if let Some(next) =
                                inner.session.users.iter_mut().find(|u| u.id == id)
                            {
                                next.host = true;
                                info!(user = %next.name, "host departed, reassigned");
                            }
                            if id == inner.self_user.id {
                                inner.self_user.host = true;
                            }
                        }
                    }
                    host_snapshot(inner)
                }
                EventType::UserDataChanged => {
                    let user: User = match event.typed_payload() {
                        Ok(u) => u,
                        Err(err) => {
                            warn!(error = %err, "discarding update event with bad payload");
                            return true;
                        }
                    };
                    if let Some(entry) =
                        inner.session.users.iter_mut().find(|u| u.id == user.id)
                    {
                        *entry = user;
                    }
                    host_snapshot(inner)
                }
                EventType::General => {
                    inner.session.push_history(event.clone());
                    host_snapshot(inner)
                }
            }
        };

        if let Some((key, snapshot)) = persist {
            if let Err(err) = self.store.set(&key, &snapshot, SESSION_TTL).await {
                warn!(error = %err, "host failed to persist session");
            }
        }
        false
    }

    /// Flip the local participant to idle when past the session threshold.
    ///
    /// Called by the orchestrator's idle monitor on its tick. Returns
    /// whether the flip happened; a `UserDataChanged` notification is
    /// emitted best-effort alongside.
    pub fn tick_idle(&self) -> bool {
        let notice = {
            let mut guard = self.state.lock();
            let Some(inner) = guard.as_mut() else {
                return false;
            };
            if inner.self_user.status != Status::Connected {
                return false;
            }
            if self.last_event_sent.lock().elapsed() <= inner.session.idle_duration() {
                return false;
            }
            inner.self_user.status = Status::Idle;
            inner.self_user.clone()
        };
        info!(user = %notice.name, "idle past threshold");
        match Event::with_payload(EventType::UserDataChanged, &notice) {
            Ok(mut event) => {
                event.sender_id = notice.id;
                self.emit(event);
            }
            Err(err) => warn!(error = %err, "failed to encode idle notification"),
        }
        true
    }

    /// Leave the session: best-effort `UserLeft` farewell, close the bus
    /// handle, clear local state. Idempotent and never fails outward.
    pub async fn disconnect(&self) {
        let farewell = {
            let guard = self.state.lock();
            let Some(inner) = guard.as_ref() else { return };
            Event::with_payload(EventType::UserLeft, &inner.self_user)
        };
        match farewell {
            Ok(event) => self.send_event(event),
            Err(err) => warn!(error = %err, "failed to encode farewell"),
        }
        info!("disconnecting");
        self.bus.close().await;
        *self.state.lock() = None;
        *self.produce.lock() = None;
    }

    /// Fill in the sender and try-send onto the bus, dropping on full.
    fn emit(&self, event: Event) {
        let sink = self.produce.lock().clone();
        let Some(sink) = sink else { return };
        match sink.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(evt)) => {
                counter!(RELAY_BUS_DROPS_TOTAL).increment(1);
                warn!(event_type = ?evt.event_type, "bus sink full, dropping event");
            }
            Err(TrySendError::Closed(_)) => debug!("bus sink closed"),
        }
    }

    /// The session id, when initialized.
    pub fn session_id(&self) -> Option<String> {
        self.state.lock().as_ref().map(|i| i.session.id.clone())
    }

    /// The local participant record, when initialized.
    pub fn self_user(&self) -> Option<User> {
        self.state.lock().as_ref().map(|i| i.self_user.clone())
    }

    /// Snapshot of the roster (join order).
    pub fn users(&self) -> Vec<User> {
        self.state
            .lock()
            .as_ref()
            .map(|i| i.session.users.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the bounded history.
    pub fn history(&self) -> Vec<Event> {
        self.state
            .lock()
            .as_ref()
            .map(|i| i.session.history.clone())
            .unwrap_or_default()
    }

    /// Time since the last locally sent event.
    pub fn last_event_elapsed(&self) -> Duration {
        self.last_event_sent.lock().elapsed()
    }
}

/// Clone what the host must re-persist; `None` for non-hosts.
fn host_snapshot(inner: &Inner) -> Option<(String, Session)> {
    if inner.self_user.host {
        Some((inner.session.store_key(), inner.session.clone()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use huddle_bus::PubSubBus;
    use huddle_store::MemoryStore;

    fn collaborators() -> (Arc<MemoryStore>, Arc<PubSubBus>) {
        (Arc::new(MemoryStore::new()), Arc::new(PubSubBus::new(16)))
    }

    fn participant(id: &str, name: &str) -> User {
        User::new(id, name)
    }

    #[tokio::test]
    async fn init_creates_session_on_store_miss() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store.clone(), bus.handle());

        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let me = coord.self_user().unwrap();
        assert!(me.host);
        assert_eq!(me.status, Status::Connected);
        assert!(me.joined > 0);

        // The creator lands in the persisted roster.
        let record = store.get("room1_session_info").await.unwrap();
        assert_eq!(record.users.len(), 1);
        assert_eq!(record.users[0].id, "a");
        assert!(record.users[0].host);
    }

    #[tokio::test]
    async fn init_joins_existing_session_without_host() {
        let (store, bus) = collaborators();
        let first = SessionCoordinator::new(store.clone(), bus.handle());
        let _a = first.init("room1", participant("a", "alice")).await.unwrap();

        let second = SessionCoordinator::new(store.clone(), bus.handle());
        let _b = second.init("room1", participant("b", "bob")).await.unwrap();

        assert!(!second.self_user().unwrap().host);
    }

    #[tokio::test]
    async fn join_publishes_user_joined() {
        let (store, bus) = collaborators();
        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let first = SessionCoordinator::new(store.clone(), bus.handle());
        let _a = first.init("room1", participant("a", "alice")).await.unwrap();

        let second = SessionCoordinator::new(store.clone(), bus.handle());
        let _b = second.init("room1", participant("b", "bob")).await.unwrap();

        // Only the joiner broadcasts; the creator is silent.
        let evt = watched.recv().await.unwrap();
        assert_eq!(evt.event_type, EventType::UserJoined);
        let joined: User = evt.typed_payload().unwrap();
        assert_eq!(joined.id, "b");
        assert!(!joined.host);
    }

    #[tokio::test]
    async fn double_init_fails_with_state_unchanged() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let err = coord
            .init("room2", participant("x", "mallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyInitialized));
        assert_eq!(coord.session_id().as_deref(), Some("room1"));
        assert_eq!(coord.self_user().unwrap().id, "a");
    }

    #[tokio::test]
    async fn joining_empty_roster_grants_host() {
        let (store, bus) = collaborators();
        // A stale record with an empty roster (everyone left, TTL not yet
        // expired).
        let session = Session::new("room1");
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();
        assert!(coord.self_user().unwrap().host);
    }

    #[tokio::test]
    async fn process_join_appends_and_host_persists() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store.clone(), bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let mut joiner = participant("b", "bob");
        joiner.mark_joined(10);
        let event = Event::with_payload(EventType::UserJoined, &joiner).unwrap();
        let suppressed = coord.process_event(&event).await;

        assert!(!suppressed);
        assert_eq!(coord.users().len(), 2);
        // Host re-persisted the roster.
        let record = store.get("room1_session_info").await.unwrap();
        assert_eq!(record.users.len(), 2);
    }

    #[tokio::test]
    async fn non_host_does_not_persist() {
        let (store, bus) = collaborators();
        let first = SessionCoordinator::new(store.clone(), bus.handle());
        let _a = first.init("room1", participant("a", "alice")).await.unwrap();

        let second = SessionCoordinator::new(store.clone(), bus.handle());
        let _b = second.init("room1", participant("b", "bob")).await.unwrap();

        let mut event = Event::new(EventType::General);
        event.message = "hello".into();
        let _ = second.process_event(&event).await;

        // The store still holds the host's version: roster of one, no
        // history.
        let record = store.get("room1_session_info").await.unwrap();
        assert!(record.history.is_empty());
    }

    #[tokio::test]
    async fn general_events_fill_bounded_history() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        session.max_history = 2;
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        for i in 0..4 {
            let mut event = Event::new(EventType::General);
            event.message = format!("m{i}");
            let _ = coord.process_event(&event).await;
        }
        let history = coord.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "m2");
        assert_eq!(history[1].message, "m3");
    }

    #[tokio::test]
    async fn process_before_init_suppresses() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store, bus.handle());
        let event = Event::new(EventType::General);
        assert!(coord.process_event(&event).await);
    }

    #[tokio::test]
    async fn undecodable_join_payload_is_suppressed() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let mut event = Event::new(EventType::UserJoined);
        event.data = serde_json::json!("not a user");
        assert!(coord.process_event(&event).await);
        assert_eq!(coord.users().len(), 1);
    }

    #[tokio::test]
    async fn send_event_fills_sender_and_reaches_bus() {
        let (store, bus) = collaborators();
        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let mut event = Event::new(EventType::General);
        event.message = "hi".into();
        coord.send_event(event);

        let got = watched.recv().await.unwrap();
        assert_eq!(got.sender_id, "a");
        assert_eq!(got.message, "hi");
    }

    #[tokio::test]
    async fn send_event_preserves_explicit_sender() {
        let (store, bus) = collaborators();
        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        let mut event = Event::new(EventType::General);
        event.sender_id = "forwarded".into();
        coord.send_event(event);
        assert_eq!(watched.recv().await.unwrap().sender_id, "forwarded");
    }

    /// A bus whose produce sink is never drained: capacity 1, no forwarder.
    struct StuckBus {
        kept: Mutex<Vec<mpsc::Receiver<Event>>>,
    }

    impl StuckBus {
        fn new() -> Self {
            Self {
                kept: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageBus for StuckBus {
        async fn produce(&self, _topic: &str) -> mpsc::Sender<Event> {
            let (tx, rx) = mpsc::channel(1);
            self.kept.lock().push(rx);
            tx
        }

        async fn subscribe(&self, _topic: &str) -> mpsc::Receiver<Event> {
            let (tx, rx) = mpsc::channel(1);
            // Keep the sender alive so the source pends forever.
            std::mem::forget(tx);
            rx
        }

        fn handle(&self) -> Arc<dyn MessageBus> {
            Arc::new(Self::new())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn send_event_on_full_sink_drops_without_blocking() {
        let store = Arc::new(MemoryStore::new());
        let coord = SessionCoordinator::new(store, Arc::new(StuckBus::new()));
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        // Capacity is 1: the first send fills the sink, the rest drop.
        for i in 0..5 {
            let mut event = Event::new(EventType::General);
            event.message = format!("m{i}");
            coord.send_event(event);
        }
        // Still alive and unchanged — nothing blocked, nothing panicked.
        assert_eq!(coord.session_id().as_deref(), Some("room1"));
    }

    #[tokio::test]
    async fn tick_idle_flips_status_and_notifies() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        session.idle_duration_secs = 0;
        session.users.push({
            let mut u = participant("z", "zoe");
            u.mark_joined(1);
            u.host = true;
            u
        });
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let coord = SessionCoordinator::new(store, bus.handle());
        let mut source = coord.init("room1", participant("a", "alice")).await.unwrap();
        // Drain our own join broadcast.
        let _join = source.recv().await.unwrap();
        let _join = watched.recv().await.unwrap();

        assert!(coord.tick_idle());
        assert_eq!(coord.self_user().unwrap().status, Status::Idle);

        let notice = watched.recv().await.unwrap();
        assert_eq!(notice.event_type, EventType::UserDataChanged);
        let payload: User = notice.typed_payload().unwrap();
        assert_eq!(payload.status, Status::Idle);

        // A second tick is a no-op while already idle.
        assert!(!coord.tick_idle());
    }

    #[tokio::test]
    async fn send_event_wakes_from_idle() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        session.idle_duration_secs = 0;
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();
        let _join = watched.recv().await.unwrap();

        assert!(coord.tick_idle());
        let _idle_notice = watched.recv().await.unwrap();

        let mut event = Event::new(EventType::General);
        event.message = "back".into();
        coord.send_event(event);

        assert_eq!(coord.self_user().unwrap().status, Status::Connected);
        // The original event, then the wake notification.
        assert_eq!(watched.recv().await.unwrap().message, "back");
        let wake = watched.recv().await.unwrap();
        assert_eq!(wake.event_type, EventType::UserDataChanged);
        let payload: User = wake.typed_payload().unwrap();
        assert_eq!(payload.status, Status::Connected);
    }

    #[tokio::test]
    async fn user_left_removes_and_reassigns_host_to_oldest() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        let mut a = participant("a", "alice");
        a.mark_joined(100);
        a.host = true;
        let mut b = participant("b", "bob");
        b.mark_joined(200);
        session.users = vec![a.clone(), b];
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let coord = SessionCoordinator::new(store, bus.handle());
        let mut source = coord.init("room1", participant("c", "cam")).await.unwrap();
        // Apply our own join echo so the roster holds a, b, c.
        let join = source.recv().await.unwrap();
        let _ = coord.process_event(&join).await;
        assert_eq!(coord.users().len(), 3);

        let leave = Event::with_payload(EventType::UserLeft, &a).unwrap();
        let suppressed = coord.process_event(&leave).await;
        assert!(!suppressed);

        let users = coord.users();
        assert_eq!(users.len(), 2);
        // b (joined 200) is older than c, so b inherits the session.
        assert!(users.iter().find(|u| u.id == "b").unwrap().host);
        assert!(!users.iter().find(|u| u.id == "c").unwrap().host);
        assert_eq!(users.iter().filter(|u| u.host).count(), 1);
    }

    #[tokio::test]
    async fn self_inherits_host_when_last_remaining() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        let mut a = participant("a", "alice");
        a.mark_joined(100);
        a.host = true;
        session.users = vec![a.clone()];
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let coord = SessionCoordinator::new(store, bus.handle());
        let mut source = coord.init("room1", participant("b", "bob")).await.unwrap();
        let join = source.recv().await.unwrap();
        let _ = coord.process_event(&join).await;

        let leave = Event::with_payload(EventType::UserLeft, &a).unwrap();
        let _ = coord.process_event(&leave).await;

        assert!(coord.self_user().unwrap().host);
        assert!(coord.users().iter().find(|u| u.id == "b").unwrap().host);
    }

    #[tokio::test]
    async fn user_data_changed_updates_roster_entry() {
        let (store, bus) = collaborators();
        let mut session = Session::new("room1");
        let mut a = participant("a", "alice");
        a.mark_joined(100);
        a.host = true;
        session.users = vec![a.clone()];
        store
            .set("room1_session_info", &session, SESSION_TTL)
            .await
            .unwrap();

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("b", "bob")).await.unwrap();

        a.status = Status::Idle;
        let update = Event::with_payload(EventType::UserDataChanged, &a).unwrap();
        let suppressed = coord.process_event(&update).await;
        assert!(!suppressed);
        assert_eq!(
            coord.users().iter().find(|u| u.id == "a").unwrap().status,
            Status::Idle
        );
    }

    #[tokio::test]
    async fn disconnect_emits_one_farewell_and_is_idempotent() {
        let (store, bus) = collaborators();
        let observer = bus.handle();
        let mut watched = observer.subscribe("session:room1").await;

        let coord = SessionCoordinator::new(store, bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        coord.disconnect().await;
        coord.disconnect().await;

        let farewell = watched.recv().await.unwrap();
        assert_eq!(farewell.event_type, EventType::UserLeft);
        let payload: User = farewell.typed_payload().unwrap();
        assert_eq!(payload.id, "a");

        // No second farewell, and the coordinator is terminal.
        tokio::task::yield_now().await;
        assert!(watched.try_recv().is_err());
        assert!(coord.session_id().is_none());
        assert!(coord.process_event(&Event::new(EventType::General)).await);
    }

    #[tokio::test]
    async fn at_most_one_host_across_join_sequence() {
        let (store, bus) = collaborators();
        let coord = SessionCoordinator::new(store.clone(), bus.handle());
        let _source = coord.init("room1", participant("a", "alice")).await.unwrap();

        for (id, joined) in [("b", 10), ("c", 20), ("d", 30)] {
            let mut u = participant(id, id);
            u.mark_joined(joined);
            let event = Event::with_payload(EventType::UserJoined, &u).unwrap();
            let _ = coord.process_event(&event).await;
        }
        assert_eq!(coord.users().iter().filter(|u| u.host).count(), 1);
    }
}
