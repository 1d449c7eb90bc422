//! Router for the dispatcher sidecar.

use axum::Router;
use tower_http::trace::TraceLayer;

use super::{handlers, state::AppState};

/// Every path is relayed; the dispatcher has no routes of its own.
pub fn build(state: AppState) -> Router {
    Router::new()
        .fallback(handlers::relay)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
