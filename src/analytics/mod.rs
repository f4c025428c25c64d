//! Failure Analytics: trends, patterns and predictions, plus root cause
//!
//! Reads the persisted failure and recovery history; never touches the live
//! control loop. Every run is stored as an immutable snapshot
//! ([`AnalysisRecord`] plus the per-artifact trees) so a report generated
//! last week can be reproduced exactly from the store.
//!
//! ## Passes
//!
//! | Operation              | Window read        | Output                   |
//! |------------------------|--------------------|--------------------------|
//! | `analyze_trends(d)`    | last `d` days      | [`TrendAnalysis`]        |
//! | `detect_patterns(d)`   | last `d` days      | `Vec<FailurePattern>`    |
//! | `predict(ahead)`       | last 90 days       | `Vec<Prediction>`        |
//! | `root_cause_analysis`  | 90 days before it  | [`RootCauseAnalysis`]    |
//! | `report(d)`            | all of the above   | [`FailureReport`]        |

mod patterns;
mod prediction;
mod root_cause;
mod trend;

pub use patterns::{cascade_patterns, combination_patterns, time_pattern};
pub use prediction::predict;
pub use trend::{classify, daily_counts, linear_slope};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::defaults::{HIGH_RISK_PROBABILITY, PREDICTION_HISTORY_DAYS, ROOT_CAUSE_CORRELATION_WINDOW_SECS};
use crate::config::AnalyticsConfig;
use crate::storage::{StorageError, Store};
use crate::types::{
    AnalysisKind, AnalysisRecord, FailureEvent, FailurePattern, FailureReport, Prediction, RootCauseAnalysis,
    TrendAnalysis,
};

pub struct FailureAnalyticsEngine {
    store: Store,
    config: AnalyticsConfig,
}

impl FailureAnalyticsEngine {
    pub fn new(config: AnalyticsConfig, store: Store) -> Self {
        Self { store, config }
    }

    fn events_since(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<FailureEvent>, StorageError> {
        self.store.failure_events_since(now - Duration::days(days))
    }

    /// Persist a snapshot. Failures are logged; the caller still gets its result.
    fn snapshot<T: Serialize>(&self, kind: AnalysisKind, generated_at: DateTime<Utc>, results: &T) {
        let results = match serde_json::to_value(results) {
            Ok(v) => v,
            Err(e) => {
                error!(?kind, error = %e, "Failed to encode analysis snapshot");
                return;
            }
        };
        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            kind,
            generated_at,
            results,
        };
        if let Err(e) = self.store.save_analysis(&record) {
            error!(?kind, error = %e, "Failed to persist analysis snapshot");
        }
    }

    pub fn analyze_trends(&self, days: u32) -> Result<TrendAnalysis, StorageError> {
        let now = Utc::now();
        let events = self.events_since(i64::from(days), now)?;
        let analysis = trend::analyze(&events, days, now);

        info!(
            days,
            total = analysis.total_failures,
            direction = %analysis.direction,
            trend_pct = analysis.trend_percentage,
            "Trend analysis complete"
        );
        self.snapshot(AnalysisKind::Trend, now, &analysis);
        Ok(analysis)
    }

    pub fn detect_patterns(&self, days: u32) -> Result<Vec<FailurePattern>, StorageError> {
        let now = Utc::now();
        let since = now - Duration::days(i64::from(days));
        let events = self.store.failure_events_since(since)?;
        let attempts = self.store.recovery_attempts_since(since)?;

        let patterns = patterns::detect(
            &events,
            &attempts,
            self.config.min_pattern_frequency,
            self.config.cascade_window_secs,
        );

        for pattern in &patterns {
            if let Err(e) = self.store.save_pattern(pattern, now) {
                error!(pattern = %pattern.pattern_id, error = %e, "Failed to persist pattern");
            }
        }
        info!(days, events = events.len(), patterns = patterns.len(), "Pattern detection complete");
        self.snapshot(AnalysisKind::Pattern, now, &patterns);
        Ok(patterns)
    }

    pub fn predict(&self, days_ahead: u32) -> Result<Vec<Prediction>, StorageError> {
        let now = Utc::now();
        let events = self.events_since(PREDICTION_HISTORY_DAYS, now)?;
        let predictions = prediction::predict(&events, days_ahead, now);

        for p in &predictions {
            debug!(component = %p.component, probability = p.probability, "Failure predicted");
            if let Err(e) = self.store.save_prediction(p) {
                error!(component = %p.component, error = %e, "Failed to persist prediction");
            }
        }
        info!(days_ahead, predictions = predictions.len(), "Prediction complete");
        self.snapshot(AnalysisKind::Prediction, now, &predictions);
        Ok(predictions)
    }

    /// Correlate one persisted failure event against the 90 days before it.
    pub fn root_cause_analysis(&self, event_id: Uuid) -> Result<RootCauseAnalysis, StorageError> {
        let target = self
            .store
            .find_failure_event(event_id)?
            .ok_or_else(|| StorageError::NotFound(format!("failure event {}", event_id)))?;

        let since = target.timestamp - Duration::days(PREDICTION_HISTORY_DAYS);
        let history = self.store.failure_events_since(since)?;
        let now = Utc::now();
        let analysis = root_cause::analyze(&target, &history, ROOT_CAUSE_CORRELATION_WINDOW_SECS, now);

        info!(
            event_id = %event_id,
            primary_cause = %analysis.primary_cause,
            confidence = analysis.confidence,
            "Root cause analysis complete"
        );
        self.store.save_root_cause(&analysis)?;
        self.snapshot(AnalysisKind::RootCause, now, &analysis);
        Ok(analysis)
    }

    /// Trend, patterns and 7-day predictions with combined recommendations.
    pub fn report(&self, days: u32) -> Result<FailureReport, StorageError> {
        let trend = self.analyze_trends(days)?;
        let patterns = self.detect_patterns(days)?;
        let predictions = self.predict(7)?;

        let high_risk_components: Vec<String> = predictions
            .iter()
            .filter(|p| p.probability > HIGH_RISK_PROBABILITY)
            .map(|p| p.component.clone())
            .collect();

        let mut recommendations = trend.recommendations.clone();
        if !patterns.is_empty() {
            recommendations.push(format!(
                "{} failure patterns detected; plan a response for each",
                patterns.len()
            ));
        }
        if !high_risk_components.is_empty() {
            recommendations.push(format!("High failure risk: {}", high_risk_components.join(", ")));
        }

        let report = FailureReport {
            period_days: days,
            trend,
            patterns,
            predictions,
            high_risk_components,
            recommendations,
            generated_at: Utc::now(),
        };
        self.snapshot(AnalysisKind::Report, report.generated_at, &report);
        Ok(report)
    }

    /// Snapshots stored since `since`, newest last.
    pub fn snapshots_since(
        &self,
        kind: Option<AnalysisKind>,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisRecord>, StorageError> {
        let mut records = self.store.analyses_since(since)?;
        if let Some(kind) = kind {
            records.retain(|r| r.kind == kind);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureType, Severity, TrendDirection};

    fn engine() -> (tempfile::TempDir, Store, FailureAnalyticsEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let engine = FailureAnalyticsEngine::new(AnalyticsConfig::default(), store.clone());
        (dir, store, engine)
    }

    fn save(store: &Store, component: &str, failure_type: FailureType, at: DateTime<Utc>) -> FailureEvent {
        let event = FailureEvent::new(failure_type, component, Severity::High, "x").at(at);
        store.save_failure_event(&event).unwrap();
        event
    }

    #[test]
    fn gpu_with_nine_recent_failures_is_predicted() {
        let (_dir, store, engine) = engine();
        let now = Utc::now();
        for d in [1, 4, 7, 10, 13, 16, 19, 22, 25] {
            save(&store, "gpu", FailureType::AcceleratorError, now - Duration::days(d));
        }
        for d in [40, 55, 70, 85] {
            save(&store, "gpu", FailureType::AcceleratorError, now - Duration::days(d));
        }
        save(&store, "api", FailureType::ApiError, now - Duration::days(2));

        let predictions = engine.predict(7).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].component, "gpu");
        assert!(predictions[0].probability >= 0.3);

        let stored = store.predictions_since(now - Duration::minutes(1)).unwrap();
        assert_eq!(stored.len(), 1);
        let snapshots = engine
            .snapshots_since(Some(AnalysisKind::Prediction), now - Duration::minutes(1))
            .unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[test]
    fn trend_over_quiet_week_is_stable() {
        let (_dir, store, engine) = engine();
        let now = Utc::now();
        for d in 0..7 {
            save(&store, "api", FailureType::ApiError, now - Duration::days(d) - Duration::hours(1));
        }
        let trend = engine.analyze_trends(7).unwrap();
        assert_eq!(trend.total_failures, 7);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn root_cause_for_missing_event_is_not_found() {
        let (_dir, _store, engine) = engine();
        let err = engine.root_cause_analysis(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn root_cause_is_persisted() {
        let (_dir, store, engine) = engine();
        let now = Utc::now();
        let target = save(&store, "api", FailureType::ApiTimeout, now - Duration::hours(1));
        let rca = engine.root_cause_analysis(target.id).unwrap();
        assert_eq!(rca.failure_event_id, target.id);
        assert_eq!(store.root_causes_since(now - Duration::minutes(1)).unwrap().len(), 1);
    }

    #[test]
    fn report_flags_high_risk_components() {
        let (_dir, store, engine) = engine();
        let now = Utc::now();
        for d in 0..12 {
            save(&store, "db", FailureType::DatabaseConnection, now - Duration::days(d) - Duration::hours(3));
        }
        let report = engine.report(30).unwrap();
        assert_eq!(report.high_risk_components, vec!["db".to_string()]);
        assert!(!report.patterns.is_empty());
        assert!(report.recommendations.iter().any(|r| r.contains("High failure risk: db")));
    }
}
