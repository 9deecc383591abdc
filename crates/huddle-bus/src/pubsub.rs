//! Fire-and-forget pub/sub realization of [`MessageBus`].
//!
//! One `tokio::sync::broadcast` channel per topic is the shared medium.
//! Producers forward their bounded mpsc sink into the broadcast sender;
//! subscribers forward the broadcast receiver into a bounded mpsc source.
//! A subscriber that falls behind loses the lagged messages (logged), which
//! is exactly the no-guarantee contract of this realization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use huddle_core::Event;

use crate::MessageBus;

/// Shared medium: broadcast senders per topic.
struct PubSubCore {
    channel_size: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Event>>>,
}

impl PubSubCore {
    fn sender(&self, topic: &str) -> broadcast::Sender<Event> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_size).0)
            .clone()
    }
}

/// Fire-and-forget publish/subscribe bus.
pub struct PubSubBus {
    core: Arc<PubSubCore>,
    closed: CancellationToken,
}

impl PubSubBus {
    /// Create a new bus whose channels buffer `channel_size` events.
    pub fn new(channel_size: usize) -> Self {
        Self {
            core: Arc::new(PubSubCore {
                channel_size: channel_size.max(1),
                topics: Mutex::new(HashMap::new()),
            }),
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl MessageBus for PubSubBus {
    async fn produce(&self, topic: &str) -> mpsc::Sender<Event> {
        let (tx, mut rx) = mpsc::channel::<Event>(self.core.channel_size);
        let medium = self.core.sender(topic);
        let closed = self.closed.clone();
        let topic = topic.to_string();
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = closed.cancelled() => break,
                    evt = rx.recv() => {
                        let Some(evt) = evt else { break };
                        // No subscribers is not an error for fire-and-forget.
                        if medium.send(evt).is_err() {
                            debug!(topic, "published with no subscribers");
                        }
                    }
                }
            }
            // Flush whatever was queued before the close, the farewell in
            // particular.
            while let Ok(evt) = rx.try_recv() {
                if medium.send(evt).is_err() {
                    debug!(topic, "published with no subscribers");
                }
            }
        }));
        tx
    }

    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel::<Event>(self.core.channel_size);
        let mut medium = self.core.sender(topic).subscribe();
        let closed = self.closed.clone();
        let topic = topic.to_string();
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = closed.cancelled() => break,
                    msg = medium.recv() => match msg {
                        Ok(evt) => {
                            if tx.send(evt).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(topic, lagged = n, "subscriber lagged, messages lost");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }));
        rx
    }

    fn handle(&self) -> Arc<dyn MessageBus> {
        Arc::new(Self {
            core: Arc::clone(&self.core),
            closed: CancellationToken::new(),
        })
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}
