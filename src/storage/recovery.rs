//! recovery_attempts and recovery_statistics trees

use chrono::{DateTime, Utc};

use super::{get, put, scan_all, scan_since, time_key, StorageError, Store};
use crate::types::{ActionStatistics, RecoveryAction, RecoveryAttempt};

impl Store {
    pub fn save_recovery_attempt(&self, attempt: &RecoveryAttempt) -> Result<(), StorageError> {
        put(&self.recovery_attempts, time_key(attempt.timestamp, attempt.id), attempt)
    }

    /// Attempts executed at or after `since`, oldest first.
    pub fn recovery_attempts_since(&self, since: DateTime<Utc>) -> Result<Vec<RecoveryAttempt>, StorageError> {
        scan_since(&self.recovery_attempts, since)
    }

    /// Fold `attempt` into the persisted totals for its action and return them.
    pub fn record_action_statistics(&self, attempt: &RecoveryAttempt) -> Result<ActionStatistics, StorageError> {
        let key = attempt.action.as_str().as_bytes();
        let mut stats: ActionStatistics = get(&self.recovery_statistics, key)?.unwrap_or_default();
        stats.record(attempt);
        put(&self.recovery_statistics, key, &stats)?;
        Ok(stats)
    }

    pub fn action_statistics(&self, action: RecoveryAction) -> Result<Option<ActionStatistics>, StorageError> {
        get(&self.recovery_statistics, action.as_str().as_bytes())
    }

    /// Totals for every action that has executed at least once.
    pub fn all_action_statistics(&self) -> Result<Vec<ActionStatistics>, StorageError> {
        scan_all(&self.recovery_statistics)
    }
}
