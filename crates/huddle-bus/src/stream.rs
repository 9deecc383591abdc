//! Durable consumer-group stream realization of [`MessageBus`].
//!
//! The shared medium is an append-only log per topic. Each named group
//! holds one read cursor, created at the log tail, so a new group sees only
//! messages appended after it subscribed. Consumers in the same group share
//! the cursor and therefore share load; distinct groups each see every
//! message. An entry is acknowledged (cursor advanced) when it is claimed
//! for delivery, and is never redelivered — the poison-message policy of
//! the contract.
//!
//! Handles over the same bus share the log; each default handle subscribes
//! under its own fresh group, which is what a relay connection needs for
//! full fan-out. [`StreamBus::in_group`] joins an existing group instead,
//! for load-sharing consumers.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use huddle_core::Event;

use crate::MessageBus;

/// Read position of one consumer group.
struct GroupState {
    cursor: Mutex<usize>,
}

/// Append-only log for one topic.
struct TopicLog {
    entries: Mutex<Vec<Event>>,
    appended: Notify,
    groups: Mutex<HashMap<String, Arc<GroupState>>>,
}

impl TopicLog {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            appended: Notify::new(),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create a group, starting a new group's cursor at the tail.
    fn group(&self, name: &str) -> Arc<GroupState> {
        let mut groups = self.groups.lock();
        if let Some(g) = groups.get(name) {
            return Arc::clone(g);
        }
        let tail = self.entries.lock().len();
        let g = Arc::new(GroupState {
            cursor: Mutex::new(tail),
        });
        let _ = groups.insert(name.to_string(), Arc::clone(&g));
        g
    }

    /// Claim the next unread entry for `group`, advancing its cursor.
    fn claim(&self, group: &GroupState) -> Option<Event> {
        let entries = self.entries.lock();
        let mut cursor = group.cursor.lock();
        if *cursor < entries.len() {
            let evt = entries[*cursor].clone();
            *cursor += 1;
            Some(evt)
        } else {
            None
        }
    }

    fn append(&self, evt: Event) {
        self.entries.lock().push(evt);
        self.appended.notify_waiters();
    }
}

/// Shared medium: topic logs.
struct StreamCore {
    channel_size: usize,
    topics: Mutex<HashMap<String, Arc<TopicLog>>>,
}

impl StreamCore {
    fn topic(&self, name: &str) -> Arc<TopicLog> {
        let mut topics = self.topics.lock();
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TopicLog::new())),
        )
    }
}

/// Durable consumer-group stream bus.
pub struct StreamBus {
    core: Arc<StreamCore>,
    group: String,
    consumer: String,
    closed: CancellationToken,
}

impl StreamBus {
    /// Create a new bus; this handle subscribes under a fresh group.
    pub fn new(channel_size: usize) -> Self {
        Self {
            core: Arc::new(StreamCore {
                channel_size: channel_size.max(1),
                topics: Mutex::new(HashMap::new()),
            }),
            group: Uuid::now_v7().to_string(),
            consumer: Uuid::now_v7().to_string(),
            closed: CancellationToken::new(),
        }
    }

    /// A handle over the same log that subscribes under the named group.
    ///
    /// Consumers sharing a group share load: each log entry is delivered to
    /// exactly one of them.
    pub fn in_group(&self, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            core: Arc::clone(&self.core),
            group: group.into(),
            consumer: consumer.into(),
            closed: CancellationToken::new(),
        }
    }

    /// The group this handle subscribes under.
    pub fn group(&self) -> &str {
        &self.group
    }
}

#[async_trait]
impl MessageBus for StreamBus {
    async fn produce(&self, topic: &str) -> mpsc::Sender<Event> {
        let (tx, mut rx) = mpsc::channel::<Event>(self.core.channel_size);
        let log = self.core.topic(topic);
        let closed = self.closed.clone();
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = closed.cancelled() => break,
                    evt = rx.recv() => {
                        let Some(evt) = evt else { break };
                        log.append(evt);
                    }
                }
            }
            // Flush whatever was queued before the close, the farewell in
            // particular.
            while let Ok(evt) = rx.try_recv() {
                log.append(evt);
            }
        }));
        tx
    }

    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel::<Event>(self.core.channel_size);
        let log = self.core.topic(topic);
        let group = log.group(&self.group);
        let closed = self.closed.clone();
        let consumer = self.consumer.clone();
        drop(tokio::spawn(async move {
            loop {
                if let Some(evt) = log.claim(&group) {
                    if tx.send(evt).await.is_err() {
                        debug!(consumer, "stream source dropped, consumer exiting");
                        break;
                    }
                    continue;
                }
                // Arm the notification before re-checking so an append
                // between the empty claim and the wait is not lost.
                let mut notified = pin!(log.appended.notified());
                let _ = notified.as_mut().enable();
                if let Some(evt) = log.claim(&group) {
                    if tx.send(evt).await.is_err() {
                        break;
                    }
                    continue;
                }
                tokio::select! {
                    () = closed.cancelled() => break,
                    () = &mut notified => {}
                }
            }
        }));
        rx
    }

    fn handle(&self) -> Arc<dyn MessageBus> {
        Arc::new(Self {
            core: Arc::clone(&self.core),
            group: Uuid::now_v7().to_string(),
            consumer: Uuid::now_v7().to_string(),
            closed: CancellationToken::new(),
        })
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}
