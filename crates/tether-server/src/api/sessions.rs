//! Sessions API — inspect, message, and drop named sessions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::ws::registry::SessionInfo;
use crate::AppState;
use tether_common::{TetherError, TetherResult};
use tether_protocol::{is_reserved, StatusSnapshot};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{name}", get(get_session).delete(remove_session))
        .route("/{name}/send", post(send_to_session))
        .with_state(state)
}

pub fn status_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(state)
}

// ─── Types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

// ─── Handlers ────────────────────────────────────────────────

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.sessions())
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> TetherResult<Json<SessionInfo>> {
    state
        .registry
        .lookup(&name)
        .map(Json)
        .ok_or_else(|| TetherError::NotFound(format!("session {name}")))
}

async fn remove_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> TetherResult<StatusCode> {
    if !state.registry.remove(&name) {
        return Err(TetherError::NotFound(format!("session {name}")));
    }
    state.publisher.notify_change();
    Ok(StatusCode::NO_CONTENT)
}

async fn send_to_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<SendRequest>,
) -> TetherResult<StatusCode> {
    if is_reserved(&payload.text) {
        return Err(TetherError::BadRequest(
            "heartbeat tokens cannot be sent as commands".to_string(),
        ));
    }
    state.registry.send_to(&name, &payload.text)?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.publisher.snapshot())
}
