//! Analytic snapshot trees. Snapshots are append-only; a new run supersedes,
//! never overwrites, an earlier one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{put, scan_since, time_key, StorageError, Store};
use crate::types::{AnalysisRecord, FailurePattern, Prediction, RootCauseAnalysis};

impl Store {
    pub fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        put(&self.analysis_results, time_key(record.generated_at, record.id), record)
    }

    pub fn analyses_since(&self, since: DateTime<Utc>) -> Result<Vec<AnalysisRecord>, StorageError> {
        scan_since(&self.analysis_results, since)
    }

    pub fn save_pattern(&self, pattern: &FailurePattern, run_at: DateTime<Utc>) -> Result<(), StorageError> {
        put(&self.failure_patterns, time_key(run_at, Uuid::new_v4()), pattern)
    }

    pub fn patterns_since(&self, since: DateTime<Utc>) -> Result<Vec<FailurePattern>, StorageError> {
        scan_since(&self.failure_patterns, since)
    }

    pub fn save_prediction(&self, prediction: &Prediction) -> Result<(), StorageError> {
        put(&self.predictions, time_key(prediction.generated_at, prediction.id), prediction)
    }

    pub fn predictions_since(&self, since: DateTime<Utc>) -> Result<Vec<Prediction>, StorageError> {
        scan_since(&self.predictions, since)
    }

    pub fn save_root_cause(&self, analysis: &RootCauseAnalysis) -> Result<(), StorageError> {
        put(
            &self.root_cause_analyses,
            time_key(analysis.analyzed_at, analysis.failure_event_id),
            analysis,
        )
    }

    pub fn root_causes_since(&self, since: DateTime<Utc>) -> Result<Vec<RootCauseAnalysis>, StorageError> {
        scan_since(&self.root_cause_analyses, since)
    }
}
