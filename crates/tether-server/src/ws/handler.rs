//! WebSocket handler for named device connections.
//!
//! Registers the connection under its logical name, feeds every inbound
//! frame to the `MessageRouter`, and records the disconnect when the socket
//! closes or the registry force-closes the handle.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use tether_common::TetherResult;
use tether_protocol::validate_name;

use crate::ws::registry::ConnectionHandle;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Display label for the status snapshot (defaults to the name).
    label: Option<String>,
}

// ─── Upgrade handler ─────────────────────────────────────────

/// Named WebSocket upgrade. Rejects invalid names before upgrading.
pub async fn named_ws_handler(
    ws: WebSocketUpgrade,
    Path(name): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> TetherResult<Response> {
    validate_name(&name)?;
    Ok(ws
        .on_upgrade(move |socket| handle_named_socket(socket, name, params.label, state))
        .into_response())
}

// ─── Connection worker ───────────────────────────────────────

async fn handle_named_socket(
    socket: WebSocket,
    name: String,
    label: Option<String>,
    state: Arc<AppState>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create an mpsc channel so the registry can write from any task
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(tx.clone());
    let conn_id = handle.id();

    // Forward channel → WebSocket; a Close frame ends the writer
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    state.registry.upsert_on_connect(&name, label, handle);
    state.publisher.notify_change();

    tracing::info!(%name, %conn_id, "Device WebSocket connected");

    // Receive loop
    loop {
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(%name, %conn_id, "Writer finished, ending connection");
                break;
            }
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.router.route_connection(&name, conn_id, text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    state.router.route_binary_connection(&name, conn_id, &data);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(%name, %conn_id, "Device WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(%name, %conn_id, "Device WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    // ── Cleanup ──────────────────────────────────────────────
    send_task.abort();
    if state.registry.mark_connection_closed(&name, conn_id) {
        state.publisher.notify_change();
    }
}
