//! API route table.

use axum::routing::{get, patch, post};
use axum::Router;

use super::handlers::{self, AppState};

/// Build the `/api/v1` router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        // Sessions
        .route("/sessions", get(handlers::active_sessions))
        .route("/sessions/:id", get(handlers::session_details))
        .route("/sessions/:id/cancel", post(handlers::cancel_session))
        .route("/recovery", post(handlers::trigger_recovery))
        // Reporting
        .route("/report", get(handlers::report))
        .route("/analytics/trends", get(handlers::trends))
        .route("/analytics/patterns", get(handlers::patterns))
        .route("/analytics/predictions", get(handlers::predictions))
        .route("/analytics/root_cause/:event_id", get(handlers::root_cause))
        // Runtime settings
        .route("/config", get(handlers::get_config))
        .route("/config", patch(handlers::update_config))
        .with_state(state)
}
