//! Root-cause correlation for a single failure event
//!
//! Looks at earlier incidents of the same component and failure type and
//! scores candidate causes by how consistently they accompany them:
//!
//! - `co_failure:{component}`: another component failed within the
//!   correlation window of an incident. Score = share of incidents that had it.
//! - `peak_hour:{h}`: incidents concentrate on one hour of the day. Score =
//!   that hour's share of incidents.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{CorrelationFactor, FailureEvent, FailureType, RootCauseAnalysis};

/// Build the analysis for `target` from `history` (any order, may include `target`).
pub fn analyze(
    target: &FailureEvent,
    history: &[FailureEvent],
    window_secs: i64,
    now: DateTime<Utc>,
) -> RootCauseAnalysis {
    let window = Duration::seconds(window_secs);

    let incidents: Vec<&FailureEvent> = history
        .iter()
        .filter(|e| e.component == target.component && e.failure_type == target.failure_type)
        .filter(|e| e.id != target.id && e.timestamp <= target.timestamp)
        .chain(std::iter::once(target))
        .collect();
    let similar_incidents: Vec<_> = incidents.iter().filter(|e| e.id != target.id).map(|e| e.id).collect();

    let mut correlations = co_failures(&incidents, history, &target.component, window);
    if let Some(hour_factor) = peak_hour(&incidents) {
        correlations.push(hour_factor);
    }
    correlations.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.factor.cmp(&b.factor)));

    let primary_cause = correlations
        .first()
        .map(|f| f.factor.clone())
        .unwrap_or_else(|| format!("isolated {} on {}", target.failure_type, target.component));
    let contributing_factors: Vec<String> = correlations
        .iter()
        .filter(|f| f.score > 0.5)
        .map(|f| f.factor.clone())
        .collect();

    let correlation_score = if correlations.is_empty() {
        0.0
    } else {
        correlations.iter().map(|f| f.score).sum::<f64>() / correlations.len() as f64
    };
    let history_weight = (similar_incidents.len() as f64 / 10.0).min(0.3);
    let confidence = (0.5 + 0.3 * correlation_score + history_weight).min(1.0);

    let preventive_measures = preventive_measures(target.failure_type, &contributing_factors);

    RootCauseAnalysis {
        failure_event_id: target.id,
        primary_cause,
        contributing_factors,
        correlations,
        correlation_score,
        similar_incidents,
        preventive_measures,
        confidence,
        analyzed_at: now,
    }
}

fn co_failures(
    incidents: &[&FailureEvent],
    history: &[FailureEvent],
    component: &str,
    window: Duration,
) -> Vec<CorrelationFactor> {
    let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
    for incident in incidents {
        let neighbours: BTreeSet<&str> = history
            .iter()
            .filter(|e| e.component != component)
            .filter(|e| (e.timestamp - incident.timestamp).abs() <= window)
            .map(|e| e.component.as_str())
            .collect();
        for neighbour in neighbours {
            *hits.entry(neighbour).or_default() += 1;
        }
    }

    hits.into_iter()
        .map(|(other, n)| CorrelationFactor {
            factor: format!("co_failure:{}", other),
            score: n as f64 / incidents.len() as f64,
        })
        .collect()
}

fn peak_hour(incidents: &[&FailureEvent]) -> Option<CorrelationFactor> {
    if incidents.len() < 3 {
        return None;
    }
    let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
    for incident in incidents {
        *by_hour.entry(incident.timestamp.hour()).or_default() += 1;
    }
    let (hour, n) = by_hour.into_iter().max_by_key(|(h, n)| (*n, std::cmp::Reverse(*h)))?;
    if n < 2 {
        return None;
    }
    Some(CorrelationFactor {
        factor: format!("peak_hour:{}", hour),
        score: n as f64 / incidents.len() as f64,
    })
}

fn preventive_measures(failure_type: FailureType, factors: &[String]) -> Vec<String> {
    let mut out = vec![
        "Strengthen monitoring on the affected component".to_string(),
        "Shorten the health check interval".to_string(),
    ];
    match failure_type {
        FailureType::ApiTimeout | FailureType::HighErrorRate | FailureType::ServerUnresponsive => {
            out.push("Review load balancing configuration".to_string());
            out.push("Tune auto-scaling thresholds".to_string());
        }
        FailureType::DatabaseConnection => {
            out.push("Review connection pool limits and database availability".to_string());
        }
        FailureType::ResourceExhausted | FailureType::AcceleratorError => {
            out.push("Add capacity headroom and resource usage alerts".to_string());
        }
        FailureType::WorkflowFailed | FailureType::WorkflowEngineError => {
            out.push("Add retries and checkpoints to long-running workflows".to_string());
        }
        FailureType::ApiError | FailureType::ExternalApiError => {
            out.push("Add circuit breaking around upstream calls".to_string());
        }
    }
    for factor in factors {
        if let Some(other) = factor.strip_prefix("co_failure:") {
            out.push(format!("Investigate the dependency on {}", other));
        } else if let Some(hour) = factor.strip_prefix("peak_hour:") {
            out.push(format!("Check scheduled jobs running around {}:00 UTC", hour));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use chrono::TimeZone;

    fn at(ts: DateTime<Utc>, component: &str, failure_type: FailureType) -> FailureEvent {
        FailureEvent::new(failure_type, component, Severity::High, "x").at(ts)
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, d, 2, 15, 0).single().unwrap()
    }

    #[test]
    fn consistent_co_failure_becomes_primary_cause() {
        let mut history = Vec::new();
        for d in 1..=4 {
            history.push(at(day(d), "api", FailureType::ApiTimeout));
            history.push(at(day(d) - Duration::minutes(3), "db", FailureType::DatabaseConnection));
        }
        history.push(at(day(2) + Duration::hours(6), "cache", FailureType::ResourceExhausted));
        let target = history[6].clone();

        let rca = analyze(&target, &history, 600, Utc::now());
        assert_eq!(rca.failure_event_id, target.id);
        assert_eq!(rca.similar_incidents.len(), 3);
        assert!(rca.primary_cause == "co_failure:db" || rca.primary_cause == "peak_hour:2");
        assert!(rca.contributing_factors.contains(&"co_failure:db".to_string()));
        assert!(!rca.contributing_factors.iter().any(|f| f.contains("cache")));
        assert!(rca.preventive_measures.iter().any(|m| m.contains("dependency on db")));
        assert!(rca.confidence > 0.8 && rca.confidence <= 1.0);
    }

    #[test]
    fn isolated_incident_has_base_confidence() {
        let target = at(day(5), "gpu", FailureType::AcceleratorError);
        let rca = analyze(&target, std::slice::from_ref(&target), 600, Utc::now());
        assert!(rca.similar_incidents.is_empty());
        assert!(rca.correlations.is_empty());
        assert_eq!(rca.primary_cause, "isolated accelerator_error on gpu");
        assert!((rca.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn later_incidents_are_not_similar() {
        let target = at(day(2), "api", FailureType::ApiTimeout);
        let history = vec![target.clone(), at(day(3), "api", FailureType::ApiTimeout)];
        let rca = analyze(&target, &history, 600, Utc::now());
        assert!(rca.similar_incidents.is_empty());
    }
}
