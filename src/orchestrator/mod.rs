//! Recovery Session Orchestrator: staged retry state machine
//!
//! ```text
//!             handle_failure
//!                   │ (dedup on component + failure type)
//!                   ▼
//!   ┌──────────▶ Pending ──(next_attempt_time due)──▶ InProgress
//!   │                                                    │ one round of
//!   │                                                    │ attempt_recovery
//!   │            ┌───────────────┬───────────────┬───────┴───────┐
//!   │            ▼               ▼               ▼               ▼
//!   │        success        failed, rounds   failed, stage   no strategy /
//!   │            │          left in stage    spent           timeout / error
//!   │            ▼               │               │               │
//!   │        Completed           │        next stage?──no──▶ Escalated
//!   └────────────────────────────┴───────────yes
//! ```
//!
//! Stages run Immediate → Delayed1Min → Delayed5Min and never go back. The
//! active index holds every Pending/InProgress session; leaving it (completion,
//! escalation, cancellation) releases the dedup slot for that pair.
//!
//! A cancelled session is removed from the index at once. A round already
//! running for it is allowed to finish, and its result is thrown away.

mod statistics;

pub use statistics::*;

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertDispatcher;
use crate::config::OrchestratorConfig;
use crate::detector::LivenessGuard;
use crate::recovery::AutoRecoveryEngine;
use crate::storage::{StorageError, Store};
use crate::types::{EscalationRecord, FailureEvent, RecoverySession, RecoveryStage, SessionStatus};

/// What a finished round decided.
enum RoundOutcome {
    Completed,
    Retry,
    Advanced(RecoveryStage),
    Escalate(String),
}

pub struct RecoverySessionOrchestrator {
    config: OrchestratorConfig,
    store: Store,
    engine: Arc<AutoRecoveryEngine>,
    alerts: Arc<AlertDispatcher>,
    active: Mutex<HashMap<String, RecoverySession>>,
    counters: Mutex<SessionCounters>,
    auto_recovery: AtomicBool,
    running: AtomicBool,
}

impl RecoverySessionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Store,
        engine: Arc<AutoRecoveryEngine>,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            alerts,
            active: Mutex::new(HashMap::new()),
            counters: Mutex::new(SessionCounters::default()),
            auto_recovery: AtomicBool::new(true),
            running: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<AutoRecoveryEngine> {
        &self.engine
    }

    pub fn set_auto_recovery(&self, enabled: bool) {
        self.auto_recovery.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_recovery_enabled(&self) -> bool {
        self.auto_recovery.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Reload sessions that were active when the process last stopped.
    ///
    /// A session caught mid-round is put back to Pending and runs again on
    /// the next tick.
    pub async fn restore_active_sessions(&self) -> Result<usize, StorageError> {
        let mut restored = 0;
        let mut active = self.active.lock().await;
        for mut session in self.store.sessions()? {
            if !session.status.is_active() || active.contains_key(&session.session_id) {
                continue;
            }
            if session.status == SessionStatus::InProgress {
                session.status = SessionStatus::Pending;
                self.store.save_session(&session)?;
            }
            active.insert(session.session_id.clone(), session);
            restored += 1;
        }
        if restored > 0 {
            info!(restored, "Restored active recovery sessions");
        }
        Ok(restored)
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Open a session for `event`, or return the id of the one already open
    /// for the same component and failure type.
    pub async fn handle_failure(&self, event: FailureEvent) -> Result<String, StorageError> {
        let mut active = self.active.lock().await;

        if let Some(existing) = active
            .values()
            .find(|s| s.component() == event.component && s.failure_type() == event.failure_type)
        {
            debug!(
                session_id = %existing.session_id,
                component = %event.component,
                failure_type = %event.failure_type,
                "Failure joins existing recovery session"
            );
            self.counters.lock().await.deduplicated += 1;
            return Ok(existing.session_id.clone());
        }

        let session = RecoverySession::new(event, Utc::now());
        self.store.save_session(&session)?;
        info!(
            session_id = %session.session_id,
            component = %session.component(),
            failure_type = %session.failure_type(),
            "Recovery session created"
        );
        let id = session.session_id.clone();
        active.insert(id.clone(), session);
        self.counters.lock().await.created += 1;
        Ok(id)
    }

    /// Alert on a detected failure and, when auto recovery is on, open a session.
    pub async fn intake(&self, event: FailureEvent) -> Result<Option<String>, StorageError> {
        self.alerts.send_failure_alert(&event).await;
        if !self.auto_recovery_enabled() {
            info!(component = %event.component, "Auto recovery disabled, failure recorded only");
            return Ok(None);
        }
        self.handle_failure(event).await.map(Some)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Run one round for every Pending session due at `now`. Returns their ids.
    ///
    /// The flip to InProgress is persisted while the index is locked, so a
    /// concurrent cancel always lands after it in the store.
    pub async fn process_due(&self, now: chrono::DateTime<Utc>) -> Vec<String> {
        let due: Vec<(RecoverySession, Result<(), StorageError>)> = {
            let mut active = self.active.lock().await;
            active
                .values_mut()
                .filter(|s| s.status == SessionStatus::Pending && s.next_attempt_time <= now)
                .map(|s| {
                    s.status = SessionStatus::InProgress;
                    let saved = self.store.save_session(s);
                    (s.clone(), saved)
                })
                .collect()
        };
        if due.is_empty() {
            return Vec::new();
        }

        let ids = due.iter().map(|(s, _)| s.session_id.clone()).collect();
        futures::future::join_all(due.into_iter().map(|(s, saved)| self.run_round(s, saved))).await;
        ids
    }

    async fn run_round(&self, mut session: RecoverySession, saved: Result<(), StorageError>) {
        let stage = session.current_stage;
        let outcome = match saved {
            Ok(()) => self.execute_round(&mut session).await,
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => RoundOutcome::Escalate(format!("Processing error: {}", e)),
        };

        match outcome {
            RoundOutcome::Completed => self.complete(session).await,
            RoundOutcome::Escalate(reason) => self.escalate(session, reason).await,
            RoundOutcome::Retry => {
                session.status = SessionStatus::Pending;
                session.next_attempt_time = Utc::now();
                debug!(
                    session_id = %session.session_id,
                    stage = %stage,
                    round = session.stage_rounds,
                    "Round failed, retrying in stage"
                );
                self.reschedule(session).await;
            }
            RoundOutcome::Advanced(next) => {
                let delay = next.policy().map_or(Duration::ZERO, |p| p.delay);
                session.current_stage = next;
                session.stage_rounds = 0;
                session.status = SessionStatus::Pending;
                session.next_attempt_time = Utc::now()
                    + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::zero());
                warn!(
                    session_id = %session.session_id,
                    from = %stage,
                    to = %next,
                    delay_secs = delay.as_secs(),
                    "Recovery stage exhausted, advancing"
                );
                let reason = format!("Stage {} exhausted after {} attempts", stage, session.total_attempts);
                if self.reschedule(session.clone()).await {
                    self.alerts.send_recovery_failed_alert(&session, &reason).await;
                }
            }
        }
    }

    /// One bounded `attempt_recovery` call, folded into the session.
    async fn execute_round(&self, session: &mut RecoverySession) -> Result<RoundOutcome, StorageError> {
        let stage = session.current_stage;
        let Some(policy) = stage.policy() else {
            return Ok(RoundOutcome::Escalate("Session is already in a terminal stage".to_string()));
        };

        if self.engine.strategies().actions_for(session.failure_type()).is_empty() {
            return Ok(RoundOutcome::Escalate(format!(
                "No recovery strategy for {}",
                session.failure_type()
            )));
        }

        info!(
            session_id = %session.session_id,
            stage = %stage,
            round = session.stage_rounds + 1,
            max_rounds = policy.max_rounds,
            "Running recovery round"
        );
        let attempts = match tokio::time::timeout(policy.timeout, self.engine.attempt_recovery(&session.failure_event)).await {
            Ok(attempts) => attempts,
            Err(_) => {
                self.store.record_stage_round(stage, false)?;
                return Ok(RoundOutcome::Escalate(format!(
                    "Stage {} timed out after {}s",
                    stage,
                    policy.timeout.as_secs()
                )));
            }
        };

        let succeeded = attempts.iter().any(|a| a.is_success());
        session.total_attempts += attempts.len() as u32;
        session.attempts.extend(attempts);
        session.stage_rounds += 1;
        self.store.record_stage_round(stage, succeeded)?;

        if succeeded {
            return Ok(RoundOutcome::Completed);
        }
        if session.stage_rounds < policy.max_rounds {
            return Ok(RoundOutcome::Retry);
        }
        Ok(match stage.next() {
            Some(next) => RoundOutcome::Advanced(next),
            None => RoundOutcome::Escalate("All recovery stages exhausted".to_string()),
        })
    }

    /// Put a still-active session back in the index. False if it was cancelled meanwhile.
    async fn reschedule(&self, session: RecoverySession) -> bool {
        let mut active = self.active.lock().await;
        if !active.contains_key(&session.session_id) {
            info!(session_id = %session.session_id, "Session cancelled during round, result discarded");
            return false;
        }
        if let Err(e) = self.store.save_session(&session) {
            error!(session_id = %session.session_id, error = %e, "Failed to persist session");
        }
        active.insert(session.session_id.clone(), session);
        true
    }

    /// Remove a session that reached a terminal state. False if it was cancelled meanwhile.
    async fn release(&self, session: &RecoverySession) -> bool {
        let removed = self.active.lock().await.remove(&session.session_id).is_some();
        if !removed {
            info!(session_id = %session.session_id, "Session cancelled during round, result discarded");
            return false;
        }
        if let Err(e) = self.store.save_session(session) {
            error!(session_id = %session.session_id, error = %e, "Failed to persist session");
        }
        true
    }

    async fn complete(&self, mut session: RecoverySession) {
        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.end_time = Some(now);
        if !self.release(&session).await {
            return;
        }

        if let Err(e) = self.store.resolve_failure_event(&session.failure_event, now) {
            error!(session_id = %session.session_id, error = %e, "Failed to resolve failure event");
        }
        session.failure_event.mark_resolved(now);
        self.counters.lock().await.completed += 1;

        info!(
            session_id = %session.session_id,
            component = %session.component(),
            stage = %session.current_stage,
            attempts = session.total_attempts,
            "Recovery session completed"
        );
        self.alerts.send_recovery_success_alert(&session).await;
    }

    async fn escalate(&self, mut session: RecoverySession, reason: String) {
        let now = Utc::now();
        session.status = SessionStatus::Escalated;
        session.current_stage = RecoveryStage::Escalated;
        session.escalation_reason = Some(reason.clone());
        session.end_time = Some(now);
        if !self.release(&session).await {
            return;
        }

        let record = EscalationRecord {
            session_id: session.session_id.clone(),
            component: session.component().to_string(),
            failure_type: session.failure_type(),
            reason: reason.clone(),
            total_attempts: session.total_attempts,
            escalated_at: now,
            resolved: false,
        };
        if let Err(e) = self.store.save_escalation(&record) {
            error!(session_id = %session.session_id, error = %e, "Failed to persist escalation record");
        }
        self.counters.lock().await.escalated += 1;

        error!(
            session_id = %session.session_id,
            component = %session.component(),
            failure_type = %session.failure_type(),
            attempts = session.total_attempts,
            reason = %reason,
            "Recovery session escalated"
        );
        self.alerts.send_escalation_alert(&session, &reason).await;
    }

    // ========================================================================
    // Operator controls and queries
    // ========================================================================

    /// Cancel an active session. Returns false if no active session has that id.
    pub async fn cancel_session(&self, session_id: &str, reason: &str) -> Result<bool, StorageError> {
        let Some(mut session) = self.active.lock().await.remove(session_id) else {
            return Ok(false);
        };
        session.status = SessionStatus::Cancelled;
        session.cancel_reason = Some(reason.to_string());
        session.end_time = Some(Utc::now());
        self.store.save_session(&session)?;
        self.counters.lock().await.cancelled += 1;
        info!(session_id, reason, "Recovery session cancelled");
        Ok(true)
    }

    /// Active sessions, oldest first.
    pub async fn get_active_sessions(&self) -> Vec<RecoverySession> {
        let mut sessions: Vec<_> = self.active.lock().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    /// An active session, or the last persisted state of a finished one.
    pub async fn get_session_details(&self, session_id: &str) -> Result<Option<RecoverySession>, StorageError> {
        if let Some(session) = self.active.lock().await.get(session_id) {
            return Ok(Some(session.clone()));
        }
        self.store.session(session_id)
    }

    pub async fn counters(&self) -> SessionCounters {
        self.counters.lock().await.clone()
    }

    pub async fn statistics(&self, days: u32) -> Result<OrchestratorStatistics, StorageError> {
        let since = Utc::now() - ChronoDuration::days(i64::from(days));
        let active = self.active.lock().await.len();
        statistics::collect(&self.store, since, days, active, self.counters().await)
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Event intake plus the scheduling tick. Returns when `cancel` fires,
    /// handing the queue back so the loop can be started again.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FailureEvent>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<FailureEvent> {
        let _live = LivenessGuard::raise(&self.running);
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(tick_secs = self.config.poll_interval_secs, "[Orchestrator] Task starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => {
                    let Some(event) = received else {
                        warn!("[Orchestrator] Event queue closed");
                        break;
                    };
                    if let Err(e) = self.intake(event).await {
                        error!(error = %e, backoff_secs = self.config.error_backoff_secs, "[Orchestrator] Intake failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(self.config.error_backoff_secs)) => {}
                        }
                    }
                }
                _ = tick.tick() => {
                    let processed = self.process_due(Utc::now()).await;
                    if !processed.is_empty() {
                        debug!(sessions = processed.len(), "[Orchestrator] Rounds processed");
                    }
                }
            }
        }

        info!("[Orchestrator] Received shutdown signal");
        events
    }
}
