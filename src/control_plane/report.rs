//! Status and report shapes, plus the KPI arithmetic behind them

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alerts::AlertStatistics;
use crate::config::defaults::{
    ASSUMED_DOWNTIME_PER_FAILURE_MINUTES, ESCALATION_REVIEW_COUNT, LOW_RECOVERY_SUCCESS_RATE,
    MIN_AVAILABILITY_PERCENT,
};
use crate::config::ControlSettings;
use crate::detector::{DetectorStatistics, ProbeInfo};
use crate::orchestrator::{OrchestratorStatistics, SessionCounters};
use crate::recovery::RecoveryStatistics;
use crate::types::{AlertChannel, FailureReport, RecoveryAction, RecoverySession, SessionStatus};

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DetectorStatus {
    pub running: bool,
    pub enabled_probes: usize,
    pub probes: Vec<ProbeInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub auto_recovery: bool,
    pub active_sessions: usize,
    pub counters: SessionCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsStatus {
    pub enabled: bool,
    pub enabled_channels: Vec<AlertChannel>,
}

/// Headline numbers over the status window.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatistics {
    pub period_days: u32,
    pub uptime_hours: f64,
    pub total_failures_detected: usize,
    pub failures_per_day: f64,
    pub total_recoveries_attempted: usize,
    pub successful_recoveries: usize,
    pub recovery_success_rate: f64,
    pub escalated_failures: usize,
    pub alerts_sent: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_hours: f64,
    pub settings: ControlSettings,
    pub detector: DetectorStatus,
    pub orchestrator: OrchestratorStatus,
    pub registered_actions: Vec<RecoveryAction>,
    pub alerts: AlertsStatus,
    pub statistics: SystemStatistics,
}

// ============================================================================
// Comprehensive report
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct KeyMetrics {
    /// Percent of the period assumed up
    pub availability_percent: f64,
    pub mttr_minutes: f64,
    pub mtbf_hours: f64,
    pub recovery_success_rate: f64,
    pub alert_delivery_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveReport {
    pub generated_at: DateTime<Utc>,
    pub period_days: u32,
    pub status: SystemStatus,
    pub failure_analysis: FailureReport,
    pub detector: DetectorStatistics,
    pub recovery: RecoveryStatistics,
    pub orchestrator: OrchestratorStatistics,
    pub alerts: AlertStatistics,
    pub key_metrics: KeyMetrics,
    pub recommendations: Vec<String>,
}

/// Share of the period not covered by assumed per-failure downtime, floored at 0.
pub fn availability_percent(days: u32, failures: usize) -> f64 {
    let total_minutes = f64::from(days) * 24.0 * 60.0;
    if total_minutes <= 0.0 {
        return 100.0;
    }
    let downtime = failures as f64 * ASSUMED_DOWNTIME_PER_FAILURE_MINUTES;
    ((total_minutes - downtime) / total_minutes * 100.0).clamp(0.0, 100.0)
}

/// Hours between failures; the whole period when nothing failed.
pub fn mtbf_hours(days: u32, failures: usize) -> f64 {
    let hours = f64::from(days) * 24.0;
    if failures == 0 {
        hours
    } else {
        hours / failures as f64
    }
}

/// Mean time spent in recovery actions by sessions that completed.
pub fn mttr_minutes(sessions: &[RecoverySession]) -> f64 {
    let per_session: Vec<f64> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .map(|s| s.attempts.iter().map(|a| a.duration_secs).sum::<f64>() / 60.0)
        .collect();
    if per_session.is_empty() {
        0.0
    } else {
        per_session.iter().sum::<f64>() / per_session.len() as f64
    }
}

pub fn recommendations(
    recovery: &RecoveryStatistics,
    escalations: usize,
    availability: f64,
    analytics: &[String],
) -> Vec<String> {
    let mut out = Vec::new();
    if recovery.total_attempts > 0 && recovery.success_rate < LOW_RECOVERY_SUCCESS_RATE {
        out.push(format!(
            "Recovery success rate is {:.1}%; review the recovery strategies",
            recovery.success_rate * 100.0
        ));
    }
    if escalations > ESCALATION_REVIEW_COUNT {
        out.push(format!(
            "{} sessions escalated; improve automated recovery for the affected components",
            escalations
        ));
    }
    if availability < MIN_AVAILABILITY_PERCENT {
        out.push(format!(
            "Estimated availability is {:.2}%; reduce failure frequency",
            availability
        ));
    }
    out.extend(analytics.iter().cloned());
    if out.is_empty() {
        out.push("System is operating normally; keep monitoring".to_string());
    }
    out
}
