//! Recovery types: actions, attempts, stages and sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{FailureEvent, FailureType};

// ============================================================================
// Actions
// ============================================================================

/// Named remedial action. Executors are registered against these identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RestartService,
    ReconnectDatabase,
    ClearCache,
    ScaleUp,
    Failover,
    RestartWorkflow,
    CleanupResources,
    ResetConnectionPool,
    RestartAcceleratorService,
    ClearTempFiles,
    RestartWorkflowEngine,
    ReloadConfig,
}

impl RecoveryAction {
    pub const ALL: [RecoveryAction; 12] = [
        RecoveryAction::RestartService,
        RecoveryAction::ReconnectDatabase,
        RecoveryAction::ClearCache,
        RecoveryAction::ScaleUp,
        RecoveryAction::Failover,
        RecoveryAction::RestartWorkflow,
        RecoveryAction::CleanupResources,
        RecoveryAction::ResetConnectionPool,
        RecoveryAction::RestartAcceleratorService,
        RecoveryAction::ClearTempFiles,
        RecoveryAction::RestartWorkflowEngine,
        RecoveryAction::ReloadConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::RestartService => "restart_service",
            RecoveryAction::ReconnectDatabase => "reconnect_database",
            RecoveryAction::ClearCache => "clear_cache",
            RecoveryAction::ScaleUp => "scale_up",
            RecoveryAction::Failover => "failover",
            RecoveryAction::RestartWorkflow => "restart_workflow",
            RecoveryAction::CleanupResources => "cleanup_resources",
            RecoveryAction::ResetConnectionPool => "reset_connection_pool",
            RecoveryAction::RestartAcceleratorService => "restart_accelerator_service",
            RecoveryAction::ClearTempFiles => "clear_temp_files",
            RecoveryAction::RestartWorkflowEngine => "restart_workflow_engine",
            RecoveryAction::ReloadConfig => "reload_config",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecoveryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecoveryAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown recovery action '{}'", s))
    }
}

/// Outcome of a single action execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryResult {
    Success,
    PartialSuccess,
    Failed,
    Skipped,
    RetryNeeded,
}

impl std::fmt::Display for RecoveryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryResult::Success => write!(f, "success"),
            RecoveryResult::PartialSuccess => write!(f, "partial_success"),
            RecoveryResult::Failed => write!(f, "failed"),
            RecoveryResult::Skipped => write!(f, "skipped"),
            RecoveryResult::RetryNeeded => write!(f, "retry_needed"),
        }
    }
}

/// One executed (or skipped) remedial action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryAttempt {
    pub id: Uuid,
    pub action: RecoveryAction,
    pub result: RecoveryResult,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock execution time in seconds
    pub duration_secs: f64,
    pub component: String,
    pub failure_type: FailureType,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl RecoveryAttempt {
    pub fn new(
        event: &FailureEvent,
        action: RecoveryAction,
        result: RecoveryResult,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            result,
            message: message.into(),
            timestamp: Utc::now(),
            duration_secs: duration.as_secs_f64(),
            component: event.component.clone(),
            failure_type: event.failure_type,
            context: HashMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RecoveryResult::Success
    }
}

/// Rolling per-action execution statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionStatistics {
    pub action: Option<RecoveryAction>,
    pub total_executions: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub avg_execution_secs: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ActionStatistics {
    /// Fold one attempt into the running totals.
    pub fn record(&mut self, attempt: &RecoveryAttempt) {
        self.action = Some(attempt.action);
        let n = self.total_executions as f64;
        self.avg_execution_secs = (self.avg_execution_secs * n + attempt.duration_secs) / (n + 1.0);
        self.total_executions += 1;
        match attempt.result {
            RecoveryResult::Success => self.success_count += 1,
            RecoveryResult::Failed => self.failed_count += 1,
            _ => {}
        }
        self.last_execution = Some(attempt.timestamp);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_executions as f64
        }
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Tier of the staged-retry policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStage {
    Immediate,
    #[serde(rename = "delayed_1min")]
    Delayed1Min,
    #[serde(rename = "delayed_5min")]
    Delayed5Min,
    Escalated,
}

/// Delay before the first round, rounds allowed, and per-round timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub delay: Duration,
    pub max_rounds: u32,
    pub timeout: Duration,
}

impl RecoveryStage {
    pub const ACTIVE: [RecoveryStage; 3] = [
        RecoveryStage::Immediate,
        RecoveryStage::Delayed1Min,
        RecoveryStage::Delayed5Min,
    ];

    /// Policy for an active stage; `None` for the terminal stage.
    pub fn policy(&self) -> Option<StagePolicy> {
        let (delay, max_rounds, timeout) = match self {
            RecoveryStage::Immediate => (0, 2, 120),
            RecoveryStage::Delayed1Min => (60, 3, 180),
            RecoveryStage::Delayed5Min => (300, 2, 300),
            RecoveryStage::Escalated => return None,
        };
        Some(StagePolicy {
            delay: Duration::from_secs(delay),
            max_rounds,
            timeout: Duration::from_secs(timeout),
        })
    }

    /// Next active stage, or `None` once the last active stage is spent.
    pub fn next(&self) -> Option<RecoveryStage> {
        match self {
            RecoveryStage::Immediate => Some(RecoveryStage::Delayed1Min),
            RecoveryStage::Delayed1Min => Some(RecoveryStage::Delayed5Min),
            RecoveryStage::Delayed5Min | RecoveryStage::Escalated => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStage::Immediate => "immediate",
            RecoveryStage::Delayed1Min => "delayed_1min",
            RecoveryStage::Delayed5Min => "delayed_5min",
            RecoveryStage::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Escalated,
    Cancelled,
}

impl SessionStatus {
    /// Pending and in-progress sessions hold the dedup slot for their pair.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Escalated => "escalated",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateful incident record tracking staged remediation of one failure event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoverySession {
    pub session_id: String,
    pub failure_event: FailureEvent,
    pub current_stage: RecoveryStage,
    pub status: SessionStatus,
    pub total_attempts: u32,
    /// Rounds already run in `current_stage`
    pub stage_rounds: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attempts: Vec<RecoveryAttempt>,
    pub escalation_reason: Option<String>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    pub next_attempt_time: DateTime<Utc>,
}

impl RecoverySession {
    pub fn new(failure_event: FailureEvent, now: DateTime<Utc>) -> Self {
        let short = Uuid::new_v4().simple().to_string();
        let session_id = format!(
            "recovery_{}_{}_{}",
            failure_event.component,
            now.timestamp(),
            &short[..8]
        );
        Self {
            session_id,
            failure_event,
            current_stage: RecoveryStage::Immediate,
            status: SessionStatus::Pending,
            total_attempts: 0,
            stage_rounds: 0,
            start_time: now,
            end_time: None,
            attempts: Vec::new(),
            escalation_reason: None,
            cancel_reason: None,
            next_attempt_time: now,
        }
    }

    pub fn component(&self) -> &str {
        &self.failure_event.component
    }

    pub fn failure_type(&self) -> FailureType {
        self.failure_event.failure_type
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_time).num_seconds()
    }
}

/// Persisted record of a session handed to a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationRecord {
    pub session_id: String,
    pub component: String,
    pub failure_type: FailureType,
    pub reason: String,
    pub total_attempts: u32,
    pub escalated_at: DateTime<Utc>,
    pub resolved: bool,
}

/// Per-stage round counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageStatistics {
    pub total_attempts: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[test]
    fn stage_order_is_fixed_and_terminates() {
        let mut stage = RecoveryStage::Immediate;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage, "stages must only move forward");
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, RecoveryStage::ACTIVE.to_vec());
        assert!(RecoveryStage::Escalated.policy().is_none());
    }

    #[test]
    fn stage_policies_match_retry_schedule() {
        let p = RecoveryStage::Immediate.policy().unwrap();
        assert_eq!((p.delay.as_secs(), p.max_rounds, p.timeout.as_secs()), (0, 2, 120));
        let p = RecoveryStage::Delayed1Min.policy().unwrap();
        assert_eq!((p.delay.as_secs(), p.max_rounds, p.timeout.as_secs()), (60, 3, 180));
        let p = RecoveryStage::Delayed5Min.policy().unwrap();
        assert_eq!((p.delay.as_secs(), p.max_rounds, p.timeout.as_secs()), (300, 2, 300));
    }

    #[test]
    fn stage_serializes_with_duration_suffix() {
        assert_eq!(serde_json::to_string(&RecoveryStage::Delayed1Min).unwrap(), "\"delayed_1min\"");
        assert_eq!(serde_json::to_string(&RecoveryStage::Delayed5Min).unwrap(), "\"delayed_5min\"");
    }

    #[test]
    fn action_statistics_track_running_average() {
        let event = FailureEvent::new(FailureType::ApiError, "api", Severity::Medium, "x");
        let mut stats = ActionStatistics::default();
        stats.record(&RecoveryAttempt::new(
            &event,
            RecoveryAction::RestartService,
            RecoveryResult::Success,
            "ok",
            Duration::from_secs(2),
        ));
        stats.record(&RecoveryAttempt::new(
            &event,
            RecoveryAction::RestartService,
            RecoveryResult::Failed,
            "boom",
            Duration::from_secs(4),
        ));
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert!((stats.avg_execution_secs - 3.0).abs() < 1e-9);
        assert!((stats.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn session_id_names_component() {
        let event = FailureEvent::new(FailureType::DatabaseConnection, "db", Severity::Medium, "x");
        let session = RecoverySession::new(event, Utc::now());
        assert!(session.session_id.starts_with("recovery_db_"));
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.current_stage, RecoveryStage::Immediate);
    }
}
