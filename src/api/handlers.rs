//! API handlers. All return `Response` via [`ApiResponse::ok`] or [`ApiErrorResponse`].

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::analytics::FailureAnalyticsEngine;
use crate::control_plane::{ControlError, ControlPlane};
use crate::storage::StorageError;

/// Shared state: the one control plane instance.
pub type AppState = Arc<ControlPlane>;

/// Upper bound on `days` / `days_ahead` query parameters.
const MAX_QUERY_DAYS: u32 = 365;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DaysAheadQuery {
    pub days_ahead: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub component: String,
    pub failure_type: String,
}

fn days_or(days: Option<u32>, default: u32) -> u32 {
    days.unwrap_or(default).clamp(1, MAX_QUERY_DAYS)
}

/// Run an analytics call on the blocking pool; its history scans hit sled directly.
async fn analytics_blocking<T, F>(plane: &AppState, f: F) -> Result<T, ControlError>
where
    T: Send + 'static,
    F: FnOnce(&FailureAnalyticsEngine) -> Result<T, StorageError> + Send + 'static,
{
    let engine = Arc::clone(plane.analytics());
    Ok(tokio::task::spawn_blocking(move || f(&engine)).await??)
}

fn control_error(e: ControlError) -> Response {
    match e {
        ControlError::UnknownFailureType(_) => ApiErrorResponse::bad_request(e.to_string()),
        ControlError::Storage(StorageError::NotFound(what)) => ApiErrorResponse::not_found(format!("{} not found", what)),
        other => {
            tracing::error!(error = %other, "API request failed");
            ApiErrorResponse::internal(other.to_string())
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// GET /api/v1/health
pub async fn health(State(plane): State<AppState>) -> Response {
    ApiResponse::ok(json!({
        "status": "ok",
        "running": plane.is_running().await,
    }))
}

/// GET /api/v1/status
pub async fn status(State(plane): State<AppState>) -> Response {
    match plane.get_system_status().await {
        Ok(status) => ApiResponse::ok(status),
        Err(e) => control_error(e),
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// GET /api/v1/sessions
pub async fn active_sessions(State(plane): State<AppState>) -> Response {
    ApiResponse::ok(plane.get_active_sessions().await)
}

/// GET /api/v1/sessions/:id
pub async fn session_details(State(plane): State<AppState>, Path(id): Path<String>) -> Response {
    match plane.get_session_details(&id).await {
        Ok(Some(session)) => ApiResponse::ok(session),
        Ok(None) => ApiErrorResponse::not_found(format!("Session {} not found", id)),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/sessions/:id/cancel
///
/// Body is optional; `{ "reason": "..." }`.
pub async fn cancel_session(
    State(plane): State<AppState>,
    Path(id): Path<String>,
    body: Option<axum::Json<CancelRequest>>,
) -> Response {
    let reason = body
        .and_then(|axum::Json(req)| req.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Cancelled by operator".to_string());

    match plane.cancel_session(&id, &reason).await {
        Ok(true) => ApiResponse::ok(json!({ "session_id": id, "cancelled": true, "reason": reason })),
        Ok(false) => ApiErrorResponse::not_found(format!("No active session {}", id)),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/recovery
pub async fn trigger_recovery(
    State(plane): State<AppState>,
    axum::Json(req): axum::Json<TriggerRequest>,
) -> Response {
    let component = req.component.trim();
    if component.is_empty() {
        return ApiErrorResponse::bad_request("component must not be empty");
    }

    match plane.trigger_manual_recovery(component, &req.failure_type).await {
        Ok(session_id) => ApiResponse::created(json!({ "session_id": session_id })),
        Err(e) => control_error(e),
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// GET /api/v1/report?days=7
pub async fn report(State(plane): State<AppState>, Query(q): Query<DaysQuery>) -> Response {
    match plane.get_comprehensive_report(days_or(q.days, 7)).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => control_error(e),
    }
}

/// GET /api/v1/analytics/trends?days=30
pub async fn trends(State(plane): State<AppState>, Query(q): Query<DaysQuery>) -> Response {
    let days = days_or(q.days, 30);
    match analytics_blocking(&plane, move |engine| engine.analyze_trends(days)).await {
        Ok(trend) => ApiResponse::ok(trend),
        Err(e) => control_error(e),
    }
}

/// GET /api/v1/analytics/patterns?days=30
pub async fn patterns(State(plane): State<AppState>, Query(q): Query<DaysQuery>) -> Response {
    let days = days_or(q.days, 30);
    match analytics_blocking(&plane, move |engine| engine.detect_patterns(days)).await {
        Ok(patterns) => ApiResponse::ok(patterns),
        Err(e) => control_error(e),
    }
}

/// GET /api/v1/analytics/predictions?days_ahead=7
pub async fn predictions(State(plane): State<AppState>, Query(q): Query<DaysAheadQuery>) -> Response {
    let days_ahead = days_or(q.days_ahead, 7);
    match analytics_blocking(&plane, move |engine| engine.predict(days_ahead)).await {
        Ok(predictions) => ApiResponse::ok(predictions),
        Err(e) => control_error(e),
    }
}

/// GET /api/v1/analytics/root_cause/:event_id
pub async fn root_cause(State(plane): State<AppState>, Path(event_id): Path<String>) -> Response {
    let Ok(event_id) = uuid::Uuid::parse_str(&event_id) else {
        return ApiErrorResponse::bad_request(format!("'{}' is not a failure event id", event_id));
    };
    match analytics_blocking(&plane, move |engine| engine.root_cause_analysis(event_id)).await {
        Ok(analysis) => ApiResponse::ok(analysis),
        Err(e) => control_error(e),
    }
}

// ============================================================================
// Runtime settings
// ============================================================================

/// GET /api/v1/config
pub async fn get_config(State(plane): State<AppState>) -> Response {
    let settings = plane.settings();
    ApiResponse::ok(&*settings)
}

/// PATCH /api/v1/config
///
/// Body is a flat object of `[control]` keys. Unknown or ill-typed keys are
/// reported back under `ignored`, never rejected.
pub async fn update_config(State(plane): State<AppState>, axum::Json(body): axum::Json<Value>) -> Response {
    let Some(updates) = body.as_object() else {
        return ApiErrorResponse::bad_request("Expected a JSON object of configuration keys");
    };
    let report = plane.update_configuration(updates);
    let settings = plane.settings();
    ApiResponse::ok(json!({
        "applied": report.applied,
        "ignored": report.ignored,
        "settings": &*settings,
    }))
}
