use axum::{
    routing::{get, post},
    Router,
};

use crate::proxy::handlers;
use crate::proxy::middleware::cors_middleware;
use crate::proxy::state::AppState;

// The cors middleware wraps routing, so preflight OPTIONS and origin
// denials short-circuit before any handler runs.
pub fn build_widget_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(crate::proxy::health::health_check_handler))
        .route("/api/chat", post(handlers::chat::handle_chat))
        .route(
            "/api/session",
            get(handlers::session::handle_get_session).post(handlers::session::handle_update_session),
        )
        .route("/api/feedback", post(handlers::feedback::handle_feedback))
        .layer(axum::middleware::from_fn_with_state(state, cors_middleware))
}
