//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use autoheal::api::create_app;
use autoheal::{AutohealConfig, ControlPlane, FailureEvent, FailureType, Severity};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn create_test_plane() -> (tempfile::TempDir, Arc<ControlPlane>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AutohealConfig::default();
    config.storage.data_dir = dir.path().join("db");
    let plane = ControlPlane::open(config).await.unwrap();
    (dir, Arc::new(plane))
}

async fn send(plane: &Arc<ControlPlane>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = create_app(Arc::clone(plane));
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// All GET endpoints should return 200.
#[tokio::test]
async fn test_get_endpoints_return_200() {
    let (_dir, plane) = create_test_plane().await;

    let endpoints = [
        "/api/v1/health",
        "/api/v1/status",
        "/api/v1/sessions",
        "/api/v1/report",
        "/api/v1/report?days=30",
        "/api/v1/analytics/trends",
        "/api/v1/analytics/patterns?days=7",
        "/api/v1/analytics/predictions?days_ahead=3",
        "/api/v1/config",
    ];

    for endpoint in &endpoints {
        let (status, body) = send(&plane, "GET", endpoint, None).await;
        assert_eq!(status, StatusCode::OK, "GET {endpoint} returned {status}");
        assert!(body.get("data").is_some(), "GET {endpoint} missing data");
        assert_eq!(body["meta"]["version"], "1");
    }
}

#[tokio::test]
async fn test_health_reports_running_state() {
    let (_dir, plane) = create_test_plane().await;
    let (_, body) = send(&plane, "GET", "/api/v1/health", None).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["running"], false);
}

#[tokio::test]
async fn test_status_shape() {
    let (_dir, plane) = create_test_plane().await;
    let (_, body) = send(&plane, "GET", "/api/v1/status", None).await;
    let data = &body["data"];
    assert_eq!(data["running"], false);
    assert_eq!(data["settings"]["enable_auto_recovery"], true);
    assert!(data["detector"]["probes"].is_array());
    assert!(data["statistics"]["period_days"].is_number());
}

#[tokio::test]
async fn test_manual_recovery_creates_session() {
    let (_dir, plane) = create_test_plane().await;

    let (status, body) = send(
        &plane,
        "POST",
        "/api/v1/recovery",
        Some(json!({"component": "billing", "failure_type": "api_error"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["session_id"].as_str().unwrap().to_string();

    let (status, body) = send(&plane, "GET", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(&plane, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["failure_event"]["component"], "billing");
}

#[tokio::test]
async fn test_manual_recovery_rejects_unknown_type() {
    let (_dir, plane) = create_test_plane().await;
    let (status, body) = send(
        &plane,
        "POST",
        "/api/v1/recovery",
        Some(json!({"component": "billing", "failure_type": "gremlins"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("gremlins"));
}

#[tokio::test]
async fn test_manual_recovery_rejects_blank_component() {
    let (_dir, plane) = create_test_plane().await;
    let (status, _) = send(
        &plane,
        "POST",
        "/api/v1/recovery",
        Some(json!({"component": "  ", "failure_type": "api_error"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (_dir, plane) = create_test_plane().await;
    let (status, body) = send(&plane, "GET", "/api/v1/sessions/recovery_missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&plane, "POST", "/api/v1/sessions/recovery_missing/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_session_records_reason() {
    let (_dir, plane) = create_test_plane().await;
    let id = plane.trigger_manual_recovery("db", "database_connection").await.unwrap();

    let (status, body) = send(
        &plane,
        "POST",
        &format!("/api/v1/sessions/{id}/cancel"),
        Some(json!({"reason": "maintenance window"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], true);

    let (_, body) = send(&plane, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancel_reason"], "maintenance window");

    // Already cancelled
    let (status, _) = send(&plane, "POST", &format!("/api/v1/sessions/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patch_config_reports_applied_and_ignored() {
    let (_dir, plane) = create_test_plane().await;
    let (status, body) = send(
        &plane,
        "PATCH",
        "/api/v1/config",
        Some(json!({"enable_alerts": false, "enable_alert": true, "analytics_interval": "soon"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["applied"], json!(["enable_alerts"]));
    assert_eq!(body["data"]["ignored"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["settings"]["enable_alerts"], false);
    assert!(!plane.alerts().is_enabled());
}

#[tokio::test]
async fn test_patch_config_requires_object() {
    let (_dir, plane) = create_test_plane().await;
    let (status, _) = send(&plane, "PATCH", "/api/v1/config", Some(json!([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_contains_key_metrics() {
    let (_dir, plane) = create_test_plane().await;
    let (_, body) = send(&plane, "GET", "/api/v1/report?days=14", None).await;
    let data = &body["data"];
    assert_eq!(data["period_days"], 14);
    assert_eq!(data["key_metrics"]["availability_percent"], 100.0);
    assert_eq!(data["key_metrics"]["mtbf_hours"], 336.0);
    assert_eq!(data["key_metrics"]["alert_delivery_rate"], 1.0);
    assert!(data["recommendations"].as_array().is_some_and(|r| !r.is_empty()));
}

#[tokio::test]
async fn test_analytics_endpoints_read_stored_history() {
    let (_dir, plane) = create_test_plane().await;
    for _ in 0..3 {
        let event = FailureEvent::new(FailureType::ApiError, "billing", Severity::Medium, "HTTP 500");
        plane.store().save_failure_event(&event).unwrap();
    }

    let (status, body) = send(&plane, "GET", "/api/v1/analytics/trends?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_failures"], 3);
    assert_eq!(body["data"]["most_affected_component"], "billing");

    let (status, body) = send(&plane, "GET", "/api/v1/analytics/patterns?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().iter().any(|p| p["pattern_id"] == "combo_billing_api_error"));
}

#[tokio::test]
async fn test_root_cause_endpoint() {
    let (_dir, plane) = create_test_plane().await;
    let event = FailureEvent::new(FailureType::DatabaseConnection, "db", Severity::High, "refused");
    plane.store().save_failure_event(&event).unwrap();

    let (status, body) = send(&plane, "GET", &format!("/api/v1/analytics/root_cause/{}", event.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["failure_event_id"], event.id.to_string());

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&plane, "GET", &format!("/api/v1/analytics/root_cause/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&plane, "GET", "/api/v1/analytics/root_cause/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (_dir, plane) = create_test_plane().await;
    let (status, _) = send(&plane, "GET", "/api/v1/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
