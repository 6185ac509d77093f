//! WebSocket endpoint: chat over the socket, plus a push feed of the bound
//! session's turns and every config change.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use warp::ws::{Message, WebSocket};

use crate::server::state::{AppState, ChatRequest, ChatResponse, ServerEvent};

/// Direct answers to this socket's own messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Reply {
    ChatResponse(ChatResponse),
    Error { error: String },
}

async fn answer(state: &AppState, session_id: &str, text: &str) -> Reply {
    match serde_json::from_str::<ChatRequest>(text) {
        Ok(request) if request.message.trim().is_empty() => Reply::Error {
            error: "message must not be empty".into(),
        },
        Ok(mut request) => {
            if request.session_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                request.session_id = Some(session_id.to_string());
            }
            Reply::ChatResponse(state.chat(request).await)
        }
        Err(e) => Reply::Error {
            error: format!("invalid chat request: {e}"),
        },
    }
}

/// Whether a socket bound to `session_id` is sent `event`.
fn wants(session_id: &str, event: &ServerEvent) -> bool {
    match event {
        ServerEvent::Turn(turn) => turn.session_id == session_id,
        ServerEvent::ConfigUpdated { .. } => true,
    }
}

/// `events` is subscribed before the upgrade completes, so a client sees
/// every event published after its handshake. Turns of other sessions are
/// not forwarded.
pub async fn client_connected(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    mut events: Receiver<ServerEvent>,
) {
    let (mut tx, mut rx) = socket.split();
    tracing::info!(session = %session_id, "websocket client connected");

    loop {
        let outgoing = tokio::select! {
            incoming = rx.next() => match incoming {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(msg)) => match msg.to_str() {
                    Ok(text) => serde_json::to_string(&answer(&state, &session_id, text).await),
                    // ping / pong / binary
                    Err(()) => continue,
                },
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket receive failed");
                    break;
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) if wants(&session_id, &event) => serde_json::to_string(&event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        let payload = match outgoing {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode websocket message");
                continue;
            }
        };
        if tx.send(Message::text(payload)).await.is_err() {
            break;
        }
    }
    tracing::info!(session = %session_id, "websocket client disconnected");
}
