//! API route definitions.

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Open to any origin, credentials are never allowed
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let history_path = state.history_path.clone();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(&history_path, get(handlers::get_history))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
