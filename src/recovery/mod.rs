//! Auto Recovery Engine: runs the action menu for one failure, once
//!
//! `attempt_recovery` walks the failure type's ordered action list:
//!
//! 1. An action rate-limited for this component (cooldown or hourly cap) is
//!    passed over without producing an attempt.
//! 2. An action with no registered executor yields a `skipped` attempt.
//! 3. Otherwise the executor runs under the action timeout; an error or a
//!    timeout yields `failed`.
//! 4. The walk stops at the first `success`.
//!
//! Stage progression and escalation belong to the orchestrator; this engine
//! never retries on its own.

mod executor;
mod strategy;

pub use executor::*;
pub use strategy::*;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RecoveryConfig;
use crate::rate_limiter::RateLimiter;
use crate::storage::{StorageError, Store};
use crate::types::{ActionStatistics, FailureEvent, RecoveryAction, RecoveryAttempt, RecoveryResult};

/// Recovery statistics over a window.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatistics {
    pub period_days: u32,
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub failed_attempts: usize,
    pub success_rate: f64,
    pub avg_execution_secs: f64,
    pub by_action: BTreeMap<RecoveryAction, ActionStatistics>,
    /// All-time rolling totals per action
    pub lifetime: Vec<ActionStatistics>,
}

pub struct AutoRecoveryEngine {
    store: Store,
    strategies: StrategyTable,
    executors: RwLock<HashMap<RecoveryAction, Arc<dyn RecoveryActionExecutor>>>,
    limiter: Mutex<RateLimiter<(String, RecoveryAction)>>,
    action_timeout: Duration,
}

impl AutoRecoveryEngine {
    pub fn new(config: &RecoveryConfig, store: Store) -> Self {
        Self {
            store,
            strategies: StrategyTable::new(config.strategy_overrides()),
            executors: RwLock::new(HashMap::new()),
            limiter: Mutex::new(RateLimiter::new(
                Duration::from_secs(config.cooldown_secs),
                Some(config.max_executions_per_hour),
            )),
            action_timeout: Duration::from_secs(config.action_timeout_secs),
        }
    }

    /// Register (or replace) the executor for a named action.
    pub async fn register_executor(&self, action: RecoveryAction, executor: Arc<dyn RecoveryActionExecutor>) {
        info!(action = %action, "Recovery executor registered");
        self.executors.write().await.insert(action, executor);
    }

    pub async fn registered_actions(&self) -> Vec<RecoveryAction> {
        let mut actions: Vec<_> = self.executors.read().await.keys().copied().collect();
        actions.sort();
        actions
    }

    pub fn strategies(&self) -> &StrategyTable {
        &self.strategies
    }

    /// Try the failure type's action menu once. Empty when no strategy exists.
    pub async fn attempt_recovery(&self, event: &FailureEvent) -> Vec<RecoveryAttempt> {
        let actions = self.strategies.actions_for(event.failure_type);
        if actions.is_empty() {
            warn!(component = %event.component, failure_type = %event.failure_type, "No recovery strategy");
            return Vec::new();
        }

        info!(
            component = %event.component,
            failure_type = %event.failure_type,
            actions = actions.len(),
            "Starting recovery"
        );

        let mut attempts = Vec::new();
        for action in actions {
            let Some(attempt) = self.run_action(event, action).await else {
                continue;
            };
            self.persist(&attempt);
            let succeeded = attempt.is_success();
            attempts.push(attempt);
            if succeeded {
                info!(component = %event.component, action = %action, "Recovery action succeeded");
                break;
            }
        }
        attempts
    }

    /// One action, or `None` when rate limiting passes it over.
    async fn run_action(&self, event: &FailureEvent, action: RecoveryAction) -> Option<RecoveryAttempt> {
        let key = (event.component.clone(), action);
        let executor = {
            let mut limiter = self.limiter.lock().await;
            let now = Instant::now();
            let decision = limiter.check(&key, now);
            if !decision.is_allowed() {
                debug!(component = %event.component, action = %action, ?decision, "Action rate limited");
                return None;
            }
            let executor = self.executors.read().await.get(&action).cloned();
            if executor.is_some() {
                limiter.record(key, now);
            }
            executor
        };

        let Some(executor) = executor else {
            return Some(RecoveryAttempt::new(
                event,
                action,
                RecoveryResult::Skipped,
                format!("No executor registered for {}", action),
                Duration::ZERO,
            ));
        };

        let started = Instant::now();
        let (result, message) = match tokio::time::timeout(self.action_timeout, executor.execute(event)).await {
            Ok(Ok(outcome)) => (outcome.result, outcome.message),
            Ok(Err(e)) => (RecoveryResult::Failed, e.to_string()),
            Err(_) => (
                RecoveryResult::Failed,
                format!("{} timed out after {}s", action, self.action_timeout.as_secs()),
            ),
        };
        let elapsed = started.elapsed();

        if result == RecoveryResult::Failed {
            warn!(component = %event.component, action = %action, error = %message, "Recovery action failed");
        } else {
            debug!(component = %event.component, action = %action, result = %result, "Recovery action finished");
        }

        Some(RecoveryAttempt::new(event, action, result, message, elapsed))
    }

    fn persist(&self, attempt: &RecoveryAttempt) {
        if let Err(e) = self.store.save_recovery_attempt(attempt) {
            error!(action = %attempt.action, error = %e, "Failed to persist recovery attempt");
        }
        if let Err(e) = self.store.record_action_statistics(attempt) {
            error!(action = %attempt.action, error = %e, "Failed to update action statistics");
        }
    }

    /// Attempt totals over the last `days`, per action and overall.
    pub fn statistics(&self, days: u32) -> Result<RecoveryStatistics, StorageError> {
        let since = Utc::now() - ChronoDuration::days(i64::from(days));
        let attempts = self.store.recovery_attempts_since(since)?;

        let mut by_action: BTreeMap<RecoveryAction, ActionStatistics> = BTreeMap::new();
        for attempt in &attempts {
            by_action.entry(attempt.action).or_default().record(attempt);
        }

        let total = attempts.len();
        let successful = attempts.iter().filter(|a| a.result == RecoveryResult::Success).count();
        let failed = attempts.iter().filter(|a| a.result == RecoveryResult::Failed).count();
        let avg_execution_secs = if total == 0 {
            0.0
        } else {
            attempts.iter().map(|a| a.duration_secs).sum::<f64>() / total as f64
        };

        Ok(RecoveryStatistics {
            period_days: days,
            total_attempts: total,
            successful_attempts: successful,
            failed_attempts: failed,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            avg_execution_secs,
            by_action,
            lifetime: self.store.all_action_statistics()?,
        })
    }

    /// Forget all cooldowns (operator override).
    pub async fn reset_rate_limits(&self) {
        self.limiter.lock().await.clear();
    }
}
