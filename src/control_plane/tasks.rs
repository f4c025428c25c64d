//! Supervised background loops: self-health watchdog and analytics scheduler

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::ControlPlane;
use crate::config::defaults::{MAX_HEALTHY_ACTIVE_SESSIONS, SCHEDULER_TICK_SECS, STALE_SESSION_SECS};
use crate::types::RecoverySession;

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    FailureDetector,
    Orchestrator,
    Watchdog,
    AnalyticsScheduler,
    HttpServer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::FailureDetector => write!(f, "FailureDetector"),
            TaskName::Orchestrator => write!(f, "Orchestrator"),
            TaskName::Watchdog => write!(f, "Watchdog"),
            TaskName::AnalyticsScheduler => write!(f, "AnalyticsScheduler"),
            TaskName::HttpServer => write!(f, "HttpServer"),
        }
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Problems the watchdog reports, in a stable order.
pub fn watchdog_findings(
    detector_running: bool,
    orchestrator_running: bool,
    active: &[RecoverySession],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut findings = Vec::new();
    if !detector_running {
        findings.push("Failure detector is not running".to_string());
    }
    if !orchestrator_running {
        findings.push("Recovery orchestrator is not running".to_string());
    }
    if active.len() > MAX_HEALTHY_ACTIVE_SESSIONS {
        findings.push(format!("Too many active recovery sessions: {}", active.len()));
    }
    for session in active {
        if session.age_secs(now) > STALE_SESSION_SECS {
            findings.push(format!("Long-running recovery session: {}", session.session_id));
        }
    }
    findings
}

pub(super) async fn run_watchdog(plane: Arc<ControlPlane>, cancel: CancellationToken) -> TaskName {
    info!("[Watchdog] Task starting");
    let mut checks = 0u64;

    loop {
        let interval = Duration::from_secs(plane.settings().health_check_interval);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        checks += 1;
        let findings = plane.health_check().await;
        if !findings.is_empty() {
            warn!(issues = findings.len(), "[Watchdog] Health issues detected");
        }
    }

    info!(checks, "[Watchdog] Received shutdown signal");
    TaskName::Watchdog
}

// ============================================================================
// Analytics Scheduler
// ============================================================================

pub(super) async fn run_analytics_scheduler(plane: Arc<ControlPlane>, cancel: CancellationToken) -> TaskName {
    info!("[AnalyticsScheduler] Task starting");
    let mut last_analytics = Instant::now();
    let mut last_report = Instant::now();
    let mut runs = 0u64;

    loop {
        let settings = plane.settings();
        let tick = Duration::from_secs(
            SCHEDULER_TICK_SECS
                .min(settings.analytics_interval)
                .min(settings.status_report_interval)
                .max(1),
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }

        let settings = plane.settings();
        if last_analytics.elapsed() >= Duration::from_secs(settings.analytics_interval) {
            last_analytics = Instant::now();
            if settings.enable_analytics {
                match plane.run_analytics_pass().await {
                    Ok(pass) => {
                        runs += 1;
                        info!(
                            patterns = pass.patterns,
                            predictions = pass.predictions,
                            alerts = pass.alerts_sent,
                            "[AnalyticsScheduler] Periodic analytics complete"
                        );
                    }
                    Err(e) => error!(error = %e, "[AnalyticsScheduler] Periodic analytics failed"),
                }
            }
        }

        if last_report.elapsed() >= Duration::from_secs(settings.status_report_interval) {
            last_report = Instant::now();
            if let Err(e) = plane.send_status_report().await {
                error!(error = %e, "[AnalyticsScheduler] Status report failed");
            }
        }
    }

    info!(runs, "[AnalyticsScheduler] Received shutdown signal");
    TaskName::AnalyticsScheduler
}
