//! `/ws` endpoint: upgrade handshake and the WebSocket wire adapters.
//!
//! One JSON-encoded [`Event`] per text frame. The upgrade handshake rejects
//! disallowed origins (403) and over-capacity servers (503) before the
//! socket exists; everything after the upgrade is the orchestrator's job.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use huddle_core::{Event, User, WireError};
use huddle_session::wire::{EventSink, EventStream};
use huddle_session::{run_connection, ConnectionContext, SessionCoordinator};

use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_REJECTED_TOTAL};
use crate::server::AppState;

/// Handshake parameters.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session to join or create.
    pub session: String,
    /// Display name of the participant.
    pub name: String,
    /// Participant id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Avatar URL.
    #[serde(default, rename = "profileUrl")]
    pub profile_url: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.config.relay.origin_policy.allows(origin) {
        counter!(WS_REJECTED_TOTAL, "reason" => "origin").increment(1);
        warn!(origin = origin.unwrap_or(""), "rejecting disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let limit = state.config.max_connections;
    if limit > 0 && state.connections.load(Ordering::SeqCst) >= limit {
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, params, state))
        .into_response()
}

/// Run one upgraded connection to completion.
async fn handle_socket(socket: WebSocket, params: WsQuery, state: AppState) {
    let user_id = params
        .id
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let mut user = User::new(&user_id, &params.name);
    if let Some(url) = params.profile_url {
        user.profile_url = url;
    }

    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::clone(&state.store),
        state.bus.handle(),
    ));
    let source = match coordinator.init(&params.session, user).await {
        Ok(source) => source,
        Err(err) => {
            warn!(error = %err, session = %params.session, "session init failed");
            return;
        }
    };

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    let _ = state.connections.fetch_add(1, Ordering::SeqCst);
    info!(session = %params.session, user = %user_id, "participant connected");

    let (write, read) = socket.split();
    let ctx = ConnectionContext {
        connection_id: user_id,
        session_id: params.session,
    };
    // Tracked so graceful shutdown waits for the farewell broadcast.
    let connection = state.shutdown.spawn(run_connection(
        WsSink { inner: write },
        WsStream { inner: read },
        coordinator,
        source,
        state.config.relay.clone(),
        ctx,
        None,
        state.shutdown.token(),
    ));
    let _ = connection.await;
    let _ = state.connections.fetch_sub(1, Ordering::SeqCst);
}

/// Write half of the WebSocket, one JSON text frame per event.
struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, event: &Event) -> Result<(), WireError> {
        let text = serde_json::to_string(event).map_err(|e| WireError::Protocol(e.to_string()))?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| WireError::Io(e.to_string()))
    }
}

/// Read half of the WebSocket.
///
/// Control frames are handled below this layer; a frame that is not valid
/// event JSON surfaces as [`WireError::Protocol`].
struct WsStream {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl EventStream for WsStream {
    async fn recv(&mut self) -> Option<Result<Event, WireError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str(&text).map_err(|e| WireError::Protocol(e.to_string())),
                ),
                Ok(Message::Binary(bytes)) => Some(
                    serde_json::from_slice(&bytes).map_err(|e| WireError::Protocol(e.to_string())),
                ),
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => None,
                Err(err) => Some(Err(WireError::Io(err.to_string()))),
            };
        }
    }
}
