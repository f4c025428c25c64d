//! Recovery Session Scenarios
//!
//! Drives the orchestrator, recovery engine and alert dispatcher together
//! against a temporary store. Executors are scripted in-process; rounds are
//! stepped by calling `process_due` with explicit times instead of running
//! the loop.

use autoheal::alerts::{AlertDispatcher, LogTransport};
use autoheal::config::{OrchestratorConfig, RecoveryConfig};
use autoheal::orchestrator::RecoverySessionOrchestrator;
use autoheal::recovery::{ActionError, ActionOutcome, AutoRecoveryEngine, RecoveryActionExecutor};
use autoheal::storage::Store;
use autoheal::types::{
    AlertPriority, AlertType, FailureEvent, FailureType, RecoveryAction, RecoveryStage, SessionStatus, Severity,
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Executor with a fixed answer and optional delay.
struct Scripted {
    succeed: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(succeed: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            succeed,
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RecoveryActionExecutor for Scripted {
    async fn execute(&self, _event: &FailureEvent) -> Result<ActionOutcome, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.succeed {
            Ok(ActionOutcome::success("service restarted"))
        } else {
            Err(ActionError::Failed("service did not come back".to_string()))
        }
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Store,
    engine: Arc<AutoRecoveryEngine>,
    orch: Arc<RecoverySessionOrchestrator>,
}

fn harness(recovery: RecoveryConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let engine = Arc::new(AutoRecoveryEngine::new(&recovery, store.clone()));
    let alerts = Arc::new(AlertDispatcher::with_transports(
        store.clone(),
        vec![Arc::new(LogTransport::new(true))],
        HashMap::new(),
    ));
    let orch = Arc::new(RecoverySessionOrchestrator::new(
        OrchestratorConfig::default(),
        store.clone(),
        engine.clone(),
        alerts,
    ));
    Harness {
        _dir: dir,
        store,
        engine,
        orch,
    }
}

/// No cooldown and no practical hourly cap, so every round executes.
fn unlimited() -> RecoveryConfig {
    RecoveryConfig {
        cooldown_secs: 0,
        max_executions_per_hour: 1_000,
        ..RecoveryConfig::default()
    }
}

fn api_timeout() -> FailureEvent {
    FailureEvent::new(FailureType::ApiTimeout, "local_api", Severity::Medium, "probe failed 3 times")
}

fn escalation_alerts(store: &Store) -> Vec<autoheal::types::AlertMessage> {
    store
        .alerts_since(Utc::now() - ChronoDuration::hours(1))
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type == AlertType::Escalation)
        .collect()
}

/// First action succeeds in the Immediate stage: session completes, the
/// failure event is resolved and the dedup slot is released.
#[tokio::test]
async fn test_immediate_success_completes_session() {
    let h = harness(unlimited());
    let restart = Scripted::new(true, Duration::ZERO);
    h.engine
        .register_executor(RecoveryAction::RestartService, restart.clone())
        .await;

    let event = api_timeout();
    h.store.save_failure_event(&event).unwrap();
    let id = h.orch.handle_failure(event.clone()).await.unwrap();

    let processed = h.orch.process_due(Utc::now()).await;
    assert_eq!(processed, vec![id.clone()]);

    let session = h.orch.get_session_details(&id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_stage, RecoveryStage::Immediate);
    assert_eq!(session.total_attempts, 1);
    assert!(session.end_time.is_some());
    assert_eq!(restart.calls.load(Ordering::SeqCst), 1);

    let stored = h.store.find_failure_event(event.id).unwrap().unwrap();
    assert!(stored.resolved);
    assert!(stored.resolution_time.is_some());

    assert!(h.orch.get_active_sessions().await.is_empty());
    let again = h.orch.handle_failure(api_timeout()).await.unwrap();
    assert_ne!(again, id, "a finished session must not absorb new failures");
}

/// Every action fails: Immediate (2 rounds) → Delayed1Min (3 rounds) →
/// Delayed5Min (2 rounds) → Escalated, with exactly one critical escalation alert.
#[tokio::test]
async fn test_exhausted_stages_escalate_once() {
    let h = harness(unlimited());
    for action in [
        RecoveryAction::RestartService,
        RecoveryAction::ClearCache,
        RecoveryAction::ResetConnectionPool,
    ] {
        h.engine
            .register_executor(action, Scripted::new(false, Duration::ZERO))
            .await;
    }

    let id = h.orch.handle_failure(api_timeout()).await.unwrap();
    let mut stages_seen = Vec::new();

    let stage_of = |orch: Arc<RecoverySessionOrchestrator>, id: String| async move {
        orch.get_session_details(&id).await.unwrap().unwrap()
    };

    // Immediate: two rounds, the second advances the stage
    h.orch.process_due(Utc::now()).await;
    let s = stage_of(h.orch.clone(), id.clone()).await;
    assert_eq!((s.current_stage, s.status, s.stage_rounds), (RecoveryStage::Immediate, SessionStatus::Pending, 1));
    stages_seen.push(s.current_stage);

    h.orch.process_due(Utc::now()).await;
    let s = stage_of(h.orch.clone(), id.clone()).await;
    assert_eq!(s.current_stage, RecoveryStage::Delayed1Min);
    assert_eq!(s.stage_rounds, 0);
    let wait = (s.next_attempt_time - Utc::now()).num_seconds();
    assert!((55..=60).contains(&wait), "Delayed1Min should wait ~60s, got {wait}s");
    stages_seen.push(s.current_stage);

    // Not due yet
    assert!(h.orch.process_due(Utc::now()).await.is_empty());

    for _ in 0..3 {
        let processed = h.orch.process_due(Utc::now() + ChronoDuration::seconds(61)).await;
        assert_eq!(processed.len(), 1);
        stages_seen.push(stage_of(h.orch.clone(), id.clone()).await.current_stage);
    }
    let s = stage_of(h.orch.clone(), id.clone()).await;
    assert_eq!(s.current_stage, RecoveryStage::Delayed5Min);
    let wait = (s.next_attempt_time - Utc::now()).num_seconds();
    assert!((295..=300).contains(&wait), "Delayed5Min should wait ~300s, got {wait}s");

    for _ in 0..2 {
        h.orch.process_due(Utc::now() + ChronoDuration::seconds(301)).await;
        stages_seen.push(stage_of(h.orch.clone(), id.clone()).await.current_stage);
    }

    let s = stage_of(h.orch.clone(), id.clone()).await;
    assert_eq!(s.status, SessionStatus::Escalated);
    assert_eq!(s.current_stage, RecoveryStage::Escalated);
    assert_eq!(s.escalation_reason.as_deref(), Some("All recovery stages exhausted"));
    assert_eq!(s.total_attempts, 7 * 3);

    // Stage order never goes backwards
    assert!(stages_seen.windows(2).all(|w| w[0] <= w[1]), "{stages_seen:?}");

    let alerts = escalation_alerts(&h.store);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, AlertPriority::Critical);

    let escalations = h.store.escalations().unwrap();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].session_id, id);
    assert_eq!(escalations[0].total_attempts, 21);
    assert!(!escalations[0].resolved);

    let stats = h.orch.statistics(1).await.unwrap();
    assert_eq!(stats.escalations_total, 1);
    assert_eq!(stats.stages["immediate"].failed_count, 2);
    assert_eq!(stats.stages["delayed_1min"].failed_count, 3);
    assert_eq!(stats.stages["delayed_5min"].failed_count, 2);
    assert_eq!(stats.counters.escalated, 1);
    assert_eq!(stats.component_success_rate["local_api"], 0.0);
}

/// A failure type with no strategy escalates on its first round.
#[tokio::test]
async fn test_missing_strategy_escalates_immediately() {
    let mut recovery = unlimited();
    recovery.strategies.insert("api_error".to_string(), vec![]);
    let h = harness(recovery);

    let event = FailureEvent::new(FailureType::ApiError, "billing", Severity::High, "500s");
    let id = h.orch.handle_failure(event).await.unwrap();
    h.orch.process_due(Utc::now()).await;

    let s = h.orch.get_session_details(&id).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Escalated);
    assert_eq!(s.total_attempts, 0);
    assert!(s.escalation_reason.unwrap().contains("No recovery strategy"));
    assert_eq!(escalation_alerts(&h.store).len(), 1);
}

/// A round outliving its stage timeout escalates with the timeout as reason.
#[tokio::test(start_paused = true)]
async fn test_stage_timeout_escalates() {
    let h = harness(unlimited());
    h.engine
        .register_executor(RecoveryAction::RestartService, Scripted::new(true, Duration::from_secs(200)))
        .await;

    let id = h.orch.handle_failure(api_timeout()).await.unwrap();
    h.orch.process_due(Utc::now()).await;

    let s = h.orch.get_session_details(&id).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Escalated);
    assert_eq!(s.escalation_reason.as_deref(), Some("Stage immediate timed out after 120s"));
}

/// Cancelling while a round is running discards that round's result.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_round_discards_result() {
    let h = harness(unlimited());
    h.engine
        .register_executor(RecoveryAction::RestartService, Scripted::new(true, Duration::from_secs(10)))
        .await;

    let event = api_timeout();
    h.store.save_failure_event(&event).unwrap();
    let id = h.orch.handle_failure(event.clone()).await.unwrap();

    let orch = h.orch.clone();
    let round = tokio::spawn(async move { orch.process_due(Utc::now()).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.orch.cancel_session(&id, "operator takeover").await.unwrap());
    round.await.unwrap();

    let s = h.orch.get_session_details(&id).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Cancelled);
    assert!(!h.store.find_failure_event(event.id).unwrap().unwrap().resolved);
    assert!(h.orch.get_active_sessions().await.is_empty());
}

/// The InProgress flip is on disk before any action runs, and a cancel that
/// lands mid-round is what a restarted orchestrator sees.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_round_survives_restart() {
    let h = harness(unlimited());
    h.engine
        .register_executor(RecoveryAction::RestartService, Scripted::new(false, Duration::from_secs(10)))
        .await;

    let id = h.orch.handle_failure(api_timeout()).await.unwrap();

    let orch = h.orch.clone();
    let round = tokio::spawn(async move { orch.process_due(Utc::now()).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.store.session(&id).unwrap().unwrap().status, SessionStatus::InProgress);

    assert!(h.orch.cancel_session(&id, "operator takeover").await.unwrap());
    round.await.unwrap();
    assert_eq!(h.store.session(&id).unwrap().unwrap().status, SessionStatus::Cancelled);

    let alerts = Arc::new(AlertDispatcher::with_transports(
        h.store.clone(),
        vec![Arc::new(LogTransport::new(true))],
        HashMap::new(),
    ));
    let restarted = RecoverySessionOrchestrator::new(OrchestratorConfig::default(), h.store.clone(), h.engine.clone(), alerts);
    assert_eq!(restarted.restore_active_sessions().await.unwrap(), 0);
    assert!(restarted.get_active_sessions().await.is_empty());
}

struct Panicking;

#[async_trait]
impl RecoveryActionExecutor for Panicking {
    async fn execute(&self, _event: &FailureEvent) -> Result<ActionOutcome, ActionError> {
        panic!("executor blew up");
    }
}

/// A loop that dies by panic no longer reports itself as running.
#[tokio::test]
async fn test_liveness_flag_drops_when_loop_panics() {
    let h = harness(unlimited());
    h.engine
        .register_executor(RecoveryAction::RestartService, Arc::new(Panicking))
        .await;
    h.orch.handle_failure(api_timeout()).await.unwrap();

    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    let handle = tokio::spawn(h.orch.clone().run(rx, CancellationToken::new()));
    assert!(handle.await.unwrap_err().is_panic());
    assert!(!h.orch.is_running());
}

/// Rate-limited actions are passed over but still count as a failed round,
/// not as "no strategy".
#[tokio::test]
async fn test_rate_limited_round_is_not_escalated() {
    let h = harness(RecoveryConfig::default());
    for action in [
        RecoveryAction::RestartService,
        RecoveryAction::ClearCache,
        RecoveryAction::ResetConnectionPool,
    ] {
        h.engine
            .register_executor(action, Scripted::new(false, Duration::ZERO))
            .await;
    }

    let id = h.orch.handle_failure(api_timeout()).await.unwrap();
    h.orch.process_due(Utc::now()).await;
    h.orch.process_due(Utc::now()).await;

    let s = h.orch.get_session_details(&id).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Pending);
    assert_eq!(s.current_stage, RecoveryStage::Delayed1Min);
    // Second round was fully inside the 60s cooldown
    assert_eq!(s.total_attempts, 3);
}
