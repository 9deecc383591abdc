//! Per-connection task orchestration.
//!
//! [`run_connection`] owns one participant's lifetime on the wire. Four
//! concurrent pieces run under a single cancellation scope:
//!
//! 1. outbound writer — sole writer to the wire, draining a bounded buffer
//! 2. bus listener — session topic source → filter → process → buffer
//! 3. idle monitor — periodic [`SessionCoordinator::tick_idle`]
//! 4. inbound reader — wire frames → process → bus (runs inline here)
//!
//! The reader ending (clean close, fatal wire error, shutdown) cancels the
//! scope, the spawned tasks are joined, and the coordinator disconnects.
//! A writer failure cancels the scope the same way, so a dead wire never
//! leaves the other tasks spinning.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use huddle_core::{Event, WireError};

use crate::config::RelayConfig;
use crate::coordinator::SessionCoordinator;
use crate::wire::{EventSink, EventStream};

/// Events dropped because the connection's outbound buffer was full.
pub const RELAY_OUTBOUND_DROPS_TOTAL: &str = "relay_outbound_drops_total";
/// Events written to connections.
pub const RELAY_EVENTS_DELIVERED_TOTAL: &str = "relay_events_delivered_total";
/// Connections currently running.
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";

/// Identifies one connection in logs and spans.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: String,
    pub session_id: String,
}

/// Called after each event successfully written to the wire.
pub type DeliveryHook = Arc<dyn Fn(&Event) + Send + Sync>;

/// Drive one connection until its wire closes or the scope is cancelled.
///
/// `coordinator` must already be initialized; `bus_source` is the receiver
/// its `init` returned. Consumes the coordinator's whole remaining
/// lifecycle: callers get it back (via the `Arc`) only to inspect state.
pub async fn run_connection<S, R>(
    sink: S,
    mut stream: R,
    coordinator: Arc<SessionCoordinator>,
    bus_source: mpsc::Receiver<Event>,
    config: RelayConfig,
    ctx: ConnectionContext,
    hook: Option<DeliveryHook>,
    shutdown: CancellationToken,
) where
    S: EventSink + 'static,
    R: EventStream,
{
    let span = info_span!(
        "connection",
        id = %ctx.connection_id,
        session = %ctx.session_id,
    );
    let scope = shutdown.child_token();
    gauge!(RELAY_CONNECTIONS_ACTIVE).increment(1.0);

    let (out_tx, out_rx) = mpsc::channel::<Event>(config.write_buffer_size.max(1));

    let writer = tokio::spawn(
        outbound_writer(sink, out_rx, hook, scope.clone()).instrument(span.clone()),
    );
    let listener = tokio::spawn(
        bus_listener(bus_source, Arc::clone(&coordinator), out_tx, scope.clone())
            .instrument(span.clone()),
    );
    let monitor = tokio::spawn(
        idle_monitor(Arc::clone(&coordinator), config.idle_check_interval(), scope.clone())
            .instrument(span.clone()),
    );

    // Inbound reader, inline: wire frames feed the session and the bus.
    async {
        loop {
            tokio::select! {
                () = scope.cancelled() => break,
                frame = stream.recv() => match frame {
                    None => {
                        debug!("wire closed by peer");
                        break;
                    }
                    Some(Ok(event)) => {
                        let suppress = coordinator.process_event(&event).await;
                        if !suppress {
                            coordinator.send_event(event);
                        }
                    }
                    Some(Err(WireError::Protocol(reason))) => {
                        // The participant leaves the session but the wire
                        // stays up; later frames are suppressed.
                        warn!(reason, "malformed frame, removing from session");
                        coordinator.disconnect().await;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "wire failure");
                        break;
                    }
                },
            }
        }
    }
    .instrument(span.clone())
    .await;

    scope.cancel();
    let _ = writer.await;
    let _ = listener.await;
    let _ = monitor.await;
    coordinator.disconnect().await;
    gauge!(RELAY_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Sole writer to the wire. A write failure cancels the whole scope.
async fn outbound_writer<S: EventSink>(
    mut sink: S,
    mut out_rx: mpsc::Receiver<Event>,
    hook: Option<DeliveryHook>,
    scope: CancellationToken,
) {
    loop {
        tokio::select! {
            () = scope.cancelled() => break,
            evt = out_rx.recv() => {
                let Some(evt) = evt else { break };
                if let Err(err) = sink.send(&evt).await {
                    warn!(error = %err, "wire write failed, closing connection");
                    scope.cancel();
                    break;
                }
                counter!(RELAY_EVENTS_DELIVERED_TOTAL).increment(1);
                if let Some(hook) = &hook {
                    hook(&evt);
                }
            }
        }
    }
}

/// Session topic source → addressing filter → process → outbound buffer.
async fn bus_listener(
    mut bus_source: mpsc::Receiver<Event>,
    coordinator: Arc<SessionCoordinator>,
    out_tx: mpsc::Sender<Event>,
    scope: CancellationToken,
) {
    let self_id = coordinator.self_user().map(|u| u.id).unwrap_or_default();
    loop {
        tokio::select! {
            () = scope.cancelled() => break,
            evt = bus_source.recv() => {
                let Some(mut event) = evt else {
                    debug!("bus source ended");
                    break;
                };
                event.remote = true;
                if !event.is_broadcast() && !event.addressed_to(&self_id) {
                    continue;
                }
                if coordinator.process_event(&event).await {
                    continue;
                }
                match out_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        counter!(RELAY_OUTBOUND_DROPS_TOTAL).increment(1);
                        warn!(
                            event_type = ?dropped.event_type,
                            "slow consumer, dropping outbound event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }
}

/// Flip the participant to idle when the activity clock runs past the
/// session threshold.
async fn idle_monitor(
    coordinator: Arc<SessionCoordinator>,
    period: Duration,
    scope: CancellationToken,
) {
    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(100)));
    loop {
        tokio::select! {
            () = scope.cancelled() => break,
            _ = ticker.tick() => {
                let _ = coordinator.tick_idle();
            }
        }
    }
}
