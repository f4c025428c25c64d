//! Frequency-based failure prediction per component

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::defaults::{
    PREDICTION_MAX_CONFIDENCE, PREDICTION_MIN_PROBABILITY, PREDICTION_MIN_RECENT_FAILURES, PREDICTION_RECENT_DAYS,
};
use crate::types::{FailureEvent, Prediction};

/// Extrapolate each component's last-30-day failure rate `days_ahead` days.
///
/// `probability = min(recent / 30 × days_ahead, 1)`; components with fewer
/// than three recent failures, or a probability at or below 0.3, are not
/// reported. Highest probability first.
pub fn predict(events: &[FailureEvent], days_ahead: u32, now: DateTime<Utc>) -> Vec<Prediction> {
    let recent_start = now - Duration::days(PREDICTION_RECENT_DAYS);

    let mut by_component: BTreeMap<&str, Vec<&FailureEvent>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.timestamp >= recent_start) {
        by_component.entry(event.component.as_str()).or_default().push(event);
    }

    let mut predictions: Vec<Prediction> = by_component
        .into_iter()
        .filter(|(_, recent)| recent.len() >= PREDICTION_MIN_RECENT_FAILURES)
        .filter_map(|(component, recent)| {
            let daily_rate = recent.len() as f64 / PREDICTION_RECENT_DAYS as f64;
            let probability = (daily_rate * f64::from(days_ahead)).min(1.0);
            if probability <= PREDICTION_MIN_PROBABILITY {
                return None;
            }
            let latest = recent.iter().max_by_key(|e| e.timestamp)?;
            Some(Prediction {
                id: Uuid::new_v4(),
                component: component.to_string(),
                predicted_failure_type: latest.failure_type,
                probability,
                confidence: (recent.len() as f64 / 10.0).min(PREDICTION_MAX_CONFIDENCE),
                days_ahead,
                recent_failures: recent.len(),
                daily_rate,
                generated_at: now,
            })
        })
        .collect();

    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    predictions
}
