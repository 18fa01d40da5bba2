//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use common::protocol::{MESSAGES_PATH, READY_PATH};
use tower_http::trace::TraceLayer;

use super::{handlers, state::AppState};

/// Build the application [`Router`] with both routes and tracing attached.
///
/// No timeout layer is installed: a message is processed for as long as its
/// handler takes.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route(READY_PATH, get(handlers::ready))
        .route(MESSAGES_PATH, post(handlers::messages))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
