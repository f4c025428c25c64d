//! recovery_sessions, escalation_log and stage_statistics trees

use chrono::Utc;

use super::{get, put, scan_all, StorageError, Store};
use crate::types::{EscalationRecord, RecoverySession, RecoveryStage, StageStatistics};

impl Store {
    pub fn save_session(&self, session: &RecoverySession) -> Result<(), StorageError> {
        put(&self.recovery_sessions, session.session_id.as_bytes(), session)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<RecoverySession>, StorageError> {
        get(&self.recovery_sessions, session_id.as_bytes())
    }

    pub fn sessions(&self) -> Result<Vec<RecoverySession>, StorageError> {
        scan_all(&self.recovery_sessions)
    }

    pub fn save_escalation(&self, record: &EscalationRecord) -> Result<(), StorageError> {
        put(&self.escalation_log, record.session_id.as_bytes(), record)
    }

    pub fn escalations(&self) -> Result<Vec<EscalationRecord>, StorageError> {
        scan_all(&self.escalation_log)
    }

    /// Mark an escalation handled by an operator. Returns false if none exists.
    pub fn resolve_escalation(&self, session_id: &str) -> Result<bool, StorageError> {
        let Some(mut record) = get::<_, EscalationRecord>(&self.escalation_log, session_id.as_bytes())? else {
            return Ok(false);
        };
        record.resolved = true;
        put(&self.escalation_log, session_id.as_bytes(), &record)?;
        Ok(true)
    }

    /// Count one finished round of `stage`.
    pub fn record_stage_round(&self, stage: RecoveryStage, succeeded: bool) -> Result<(), StorageError> {
        let key = stage.as_str().as_bytes();
        let mut stats: StageStatistics = get(&self.stage_statistics, key)?.unwrap_or_default();
        stats.total_attempts += 1;
        if succeeded {
            stats.success_count += 1;
        } else {
            stats.failed_count += 1;
        }
        stats.last_updated = Some(Utc::now());
        put(&self.stage_statistics, key, &stats)
    }

    pub fn stage_statistics(&self) -> Result<Vec<(RecoveryStage, StageStatistics)>, StorageError> {
        RecoveryStage::ACTIVE
            .iter()
            .map(|stage| {
                let stats = get(&self.stage_statistics, stage.as_str().as_bytes())?.unwrap_or_default();
                Ok((*stage, stats))
            })
            .collect()
    }
}
