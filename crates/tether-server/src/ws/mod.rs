//! WebSocket gateway — one connection per logical name at `/ws/{name}`.

mod handler;
pub mod registry;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{name}", axum::routing::get(handler::named_ws_handler))
        .with_state(state)
}
