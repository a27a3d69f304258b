//! API routes module.

mod health;
mod sessions;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Build the API router with all sub-routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/sessions", sessions::router(state.clone()))
        .merge(sessions::status_router(state.clone()))
        .merge(health::router(state))
}
