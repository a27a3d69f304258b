//! # Tether Server
//!
//! WebSocket relay that lets devices reach each other by logical name.
//! Keeps the session registry, probes every session for liveness, and routes
//! text commands between devices and the status dashboard.

pub mod api;
pub mod services;
pub mod workers;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use services::router::MessageRouter;
use services::routes::RouteTable;
use services::status::StatusPublisher;
use tether_common::TetherConfig;
use ws::registry::SessionRegistry;

/// Shared application state available to all handlers and workers.
#[derive(Debug)]
pub struct AppState {
    pub config: TetherConfig,
    pub registry: Arc<SessionRegistry>,
    pub publisher: StatusPublisher,
    pub router: MessageRouter,
}

impl AppState {
    /// Build state with the forwarding routes declared in `config`.
    pub fn new(config: TetherConfig) -> Self {
        let routes = RouteTable::from_config(&config.routes);
        Self::with_routes(config, routes)
    }

    /// Build state with a caller-assembled route table.
    pub fn with_routes(config: TetherConfig, routes: RouteTable) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let publisher = StatusPublisher::new(registry.clone(), config.status.channel.clone());
        let router = MessageRouter::new(registry.clone(), routes, publisher.clone())
            .binary_is_activity(config.heartbeat.binary_is_activity);
        Self {
            config,
            registry,
            publisher,
            router,
        }
    }

    /// Force-close every connection and clear the registry.
    pub fn shutdown(&self) -> usize {
        self.registry.close_all()
    }
}

/// Build the HTTP + WebSocket router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api::router(state.clone()))
        .nest("/ws", ws::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
