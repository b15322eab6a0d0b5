//! Axum router setup for the Wirecheck server

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ServerState;
use crate::handlers::{get_entry_points, get_unreachable, health_check, post_reachability, receive_event};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Change-event intake; only schedules work
        .route("/api/events", post(receive_event))
        // Read-only graph queries
        .route("/api/repos/:owner/:name/entry-points", get(get_entry_points))
        .route("/api/repos/:owner/:name/unreachable", get(get_unreachable))
        .route("/api/repos/:owner/:name/reachability", post(post_reachability))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
