//! Session statistics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::storage::{StorageError, Store};
use crate::types::{SessionStatus, StageStatistics};

/// In-process session counters since startup.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SessionCounters {
    pub created: u64,
    pub completed: u64,
    pub escalated: u64,
    pub cancelled: u64,
    pub deduplicated: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub count: usize,
    pub avg_attempts: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatistics {
    pub period_days: u32,
    pub active_sessions: usize,
    pub by_status: BTreeMap<String, StatusSummary>,
    /// Completed / finished sessions per component
    pub component_success_rate: BTreeMap<String, f64>,
    pub escalations_total: usize,
    pub escalations_resolved: usize,
    pub stages: BTreeMap<String, StageStatistics>,
    pub counters: SessionCounters,
}

pub(super) fn collect(
    store: &Store,
    since: DateTime<Utc>,
    period_days: u32,
    active_sessions: usize,
    counters: SessionCounters,
) -> Result<OrchestratorStatistics, StorageError> {
    let sessions: Vec<_> = store
        .sessions()?
        .into_iter()
        .filter(|s| s.start_time >= since)
        .collect();

    let mut by_status: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    let mut per_component: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for session in &sessions {
        let entry = by_status.entry(session.status.as_str().to_string()).or_default();
        entry.0 += 1;
        entry.1 += u64::from(session.total_attempts);

        if !session.status.is_active() {
            let (finished, completed) = per_component.entry(session.component().to_string()).or_default();
            *finished += 1;
            if session.status == SessionStatus::Completed {
                *completed += 1;
            }
        }
    }

    let escalations: Vec<_> = store
        .escalations()?
        .into_iter()
        .filter(|e| e.escalated_at >= since)
        .collect();

    Ok(OrchestratorStatistics {
        period_days,
        active_sessions,
        by_status: by_status
            .into_iter()
            .map(|(status, (count, attempts))| {
                let summary = StatusSummary {
                    count,
                    avg_attempts: attempts as f64 / count as f64,
                };
                (status, summary)
            })
            .collect(),
        component_success_rate: per_component
            .into_iter()
            .map(|(component, (finished, completed))| (component, completed as f64 / finished as f64))
            .collect(),
        escalations_total: escalations.len(),
        escalations_resolved: escalations.iter().filter(|e| e.resolved).count(),
        stages: store
            .stage_statistics()?
            .into_iter()
            .map(|(stage, stats)| (stage.as_str().to_string(), stats))
            .collect(),
        counters,
    })
}
