//! Daily failure counts and their least-squares trend

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::config::defaults::STABLE_TREND_PERCENT;
use crate::types::{FailureEvent, FailureType, Severity, TrendAnalysis, TrendDirection};

const SECS_PER_DAY: i64 = 86_400;

/// One count per day over the last `days`, index 0 = oldest.
///
/// Events older than the window are ignored; events stamped in the future
/// land in today's bucket.
pub fn daily_counts(events: &[FailureEvent], days: u32, now: DateTime<Utc>) -> Vec<u32> {
    let mut counts = vec![0u32; days as usize];
    if days == 0 {
        return counts;
    }
    for event in events {
        let age_days = (now - event.timestamp).num_seconds().max(0) / SECS_PER_DAY;
        if age_days < i64::from(days) {
            counts[days as usize - 1 - age_days as usize] += 1;
        }
    }
    counts
}

/// Least-squares slope of `ys` against 0..n.
pub fn linear_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return 0.0;
    }
    let sum_x: f64 = (0..ys.len()).map(|i| i as f64).sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..ys.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_x2 - sum_x.powi(2);
    if denominator == 0.0 {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    }
}

/// Direction and signed slope-over-mean percentage for a count series.
pub fn classify(counts: &[u32]) -> (TrendDirection, f64) {
    if counts.len() < 2 {
        return (TrendDirection::Stable, 0.0);
    }
    let ys: Vec<f64> = counts.iter().map(|c| f64::from(*c)).collect();
    let mean = ys.iter().mean();
    if mean <= 0.0 {
        return (TrendDirection::Stable, 0.0);
    }

    let slope = linear_slope(&ys);
    let percentage = slope / mean * 100.0;
    if percentage.abs() < STABLE_TREND_PERCENT {
        return (TrendDirection::Stable, percentage);
    }

    // A large slope that is still small next to the day-to-day swing is noise
    let variance = ys.iter().variance();
    if variance > mean && slope.abs() * (ys.len() as f64) < variance.sqrt() {
        return (TrendDirection::Volatile, percentage);
    }

    if percentage > 0.0 {
        (TrendDirection::Increasing, percentage)
    } else {
        (TrendDirection::Decreasing, percentage)
    }
}

fn most_common<K: Ord + Clone>(counts: &BTreeMap<K, usize>) -> Option<(K, usize)> {
    // Ties resolve to the smallest key
    counts
        .iter()
        .fold(None, |best: Option<(&K, usize)>, (k, n)| match best {
            Some((_, b)) if b >= *n => best,
            _ => Some((k, *n)),
        })
        .map(|(k, n)| (k.clone(), n))
}

/// Full trend over `events` (already filtered to the window or wider).
pub fn analyze(events: &[FailureEvent], days: u32, now: DateTime<Utc>) -> TrendAnalysis {
    let counts = daily_counts(events, days, now);
    let total: u32 = counts.iter().sum();
    let (direction, trend_percentage) = classify(&counts);

    let window_start = now - chrono::Duration::days(i64::from(days));
    let in_window: Vec<&FailureEvent> = events.iter().filter(|e| e.timestamp > window_start).collect();

    let mut by_type: BTreeMap<FailureType, usize> = BTreeMap::new();
    let mut by_component: BTreeMap<String, usize> = BTreeMap::new();
    let mut severity_distribution: BTreeMap<Severity, usize> = BTreeMap::new();
    for event in &in_window {
        *by_type.entry(event.failure_type).or_default() += 1;
        *by_component.entry(event.component.clone()).or_default() += 1;
        *severity_distribution.entry(event.severity).or_default() += 1;
    }

    let most_frequent = most_common(&by_type);
    let most_affected = most_common(&by_component);

    let recommendations = recommendations(
        direction,
        severity_distribution.get(&Severity::Critical).copied().unwrap_or(0),
        most_frequent,
        most_affected.clone(),
        total == 0,
    );

    TrendAnalysis {
        period_days: days,
        total_failures: total as usize,
        failures_per_day: if days == 0 { 0.0 } else { f64::from(total) / f64::from(days) },
        daily_counts: counts,
        direction,
        trend_percentage,
        most_frequent_failure: most_frequent.map(|(t, _)| t),
        most_affected_component: most_affected.map(|(c, _)| c),
        severity_distribution,
        recommendations,
        generated_at: now,
    }
}

fn recommendations(
    direction: TrendDirection,
    critical: usize,
    most_frequent: Option<(FailureType, usize)>,
    most_affected: Option<(String, usize)>,
    empty: bool,
) -> Vec<String> {
    if empty {
        return vec!["No failures recorded in this period".to_string()];
    }

    let mut out = Vec::new();
    match direction {
        TrendDirection::Increasing => {
            out.push("Failure rate is increasing; schedule a system review".to_string());
            out.push("Plan preventive maintenance for the most affected components".to_string());
        }
        TrendDirection::Volatile => {
            out.push("Failure rate is volatile; review system stability".to_string());
        }
        TrendDirection::Stable | TrendDirection::Decreasing => {}
    }
    if critical > 0 {
        out.push(format!("{} critical failures occurred; review the incident response process", critical));
    }
    if let Some((failure_type, n)) = most_frequent.filter(|(_, n)| *n >= 3) {
        out.push(format!("'{}' failures occurred {} times; run a root cause analysis", failure_type, n));
    }
    if let Some((component, n)) = most_affected.filter(|(_, n)| *n >= 3) {
        out.push(format!("'{}' failed {} times; increase monitoring on it", component, n));
    }
    if out.is_empty() {
        out.push("System is stable; continue regular monitoring".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_days_ago(now: DateTime<Utc>, days: i64, component: &str) -> FailureEvent {
        FailureEvent::new(FailureType::ApiError, component, Severity::Medium, "err")
            .at(now - Duration::days(days) - Duration::minutes(1))
    }

    fn events_from_counts(now: DateTime<Utc>, counts: &[u32]) -> Vec<FailureEvent> {
        let n = counts.len() as i64;
        counts
            .iter()
            .enumerate()
            .flat_map(|(i, c)| (0..*c).map(move |_| event_days_ago(now, n - 1 - i as i64, "api")))
            .collect()
    }

    #[test]
    fn buckets_oldest_first() {
        let now = Utc::now();
        let events = vec![event_days_ago(now, 0, "a"), event_days_ago(now, 6, "a"), event_days_ago(now, 6, "b")];
        assert_eq!(daily_counts(&events, 7, now), vec![2, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let now = Utc::now();
        let events = vec![event_days_ago(now, 10, "a")];
        assert_eq!(daily_counts(&events, 7, now).iter().sum::<u32>(), 0);
    }

    #[test]
    fn slope_of_a_line() {
        assert!((linear_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-9);
        assert_eq!(linear_slope(&[5.0]), 0.0);
    }

    #[test]
    fn small_change_is_stable() {
        let (direction, pct) = classify(&[5, 5, 5, 5, 5, 5, 6]);
        assert_eq!(direction, TrendDirection::Stable);
        assert!(pct.abs() < 10.0);
    }

    #[test]
    fn rising_counts_increase() {
        let (direction, pct) = classify(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(direction, TrendDirection::Increasing);
        assert!(pct > 10.0);
        let (direction, _) = classify(&[7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(direction, TrendDirection::Decreasing);
    }

    #[test]
    fn noisy_counts_are_volatile() {
        let (direction, _) = classify(&[0, 0, 20, 0, 0, 20, 3]);
        assert_eq!(direction, TrendDirection::Volatile);
    }

    #[test]
    fn empty_history_is_stable_with_note() {
        let trend = analyze(&[], 7, Utc::now());
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.total_failures, 0);
        assert_eq!(trend.recommendations, vec!["No failures recorded in this period".to_string()]);
    }

    #[test]
    fn analysis_reports_top_type_and_component() {
        let now = Utc::now();
        let mut events = events_from_counts(now, &[1, 1, 2, 2, 3, 4, 5]);
        events.push(
            FailureEvent::new(FailureType::DatabaseConnection, "db", Severity::Critical, "down")
                .at(now - Duration::hours(2)),
        );
        let trend = analyze(&events, 7, now);
        assert_eq!(trend.total_failures, 19);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert_eq!(trend.most_frequent_failure, Some(FailureType::ApiError));
        assert_eq!(trend.most_affected_component.as_deref(), Some("api"));
        assert_eq!(trend.severity_distribution.get(&Severity::Critical), Some(&1));
        assert!(trend.recommendations.iter().any(|r| r.contains("critical failures")));
        assert!((trend.failures_per_day - 19.0 / 7.0).abs() < 1e-9);
    }
}
