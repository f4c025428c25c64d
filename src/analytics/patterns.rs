//! Pattern mining: peak hour, component/type combinations, cascades

use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::defaults::{CASCADE_MIN_LENGTH, PEAK_HOUR_SHARE};
use crate::types::{FailureEvent, FailurePattern, FailureType, PatternType, RecoveryAttempt, RecoveryResult};

fn span(events: &[&FailureEvent]) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = events.iter().map(|e| e.timestamp).min().unwrap_or_else(Utc::now);
    let last = events.iter().map(|e| e.timestamp).max().unwrap_or(first);
    (first, last)
}

fn distinct<T: Ord + Clone>(items: impl Iterator<Item = T>) -> Vec<T> {
    items.collect::<BTreeSet<_>>().into_iter().collect()
}

fn pattern(
    pattern_id: String,
    pattern_type: PatternType,
    description: String,
    members: &[&FailureEvent],
    confidence: f64,
) -> FailurePattern {
    let (first_seen, last_seen) = span(members);
    FailurePattern {
        pattern_id,
        pattern_type,
        description,
        frequency: members.len(),
        components: distinct(members.iter().map(|e| e.component.clone())),
        failure_types: distinct(members.iter().map(|e| e.failure_type)),
        confidence,
        first_seen,
        last_seen,
        recovery_success_rate: 0.0,
        avg_recovery_minutes: 0.0,
    }
}

/// Peak hour-of-day, when one hour holds more than 30% of all events.
pub fn time_pattern(events: &[FailureEvent], min_frequency: usize) -> Option<FailurePattern> {
    if events.is_empty() {
        return None;
    }
    let mut by_hour: BTreeMap<u32, Vec<&FailureEvent>> = BTreeMap::new();
    for event in events {
        by_hour.entry(event.timestamp.hour()).or_default().push(event);
    }

    let (hour, members) = by_hour
        .iter()
        .fold(None, |best: Option<(&u32, &Vec<&FailureEvent>)>, (h, m)| match best {
            Some((_, b)) if b.len() >= m.len() => best,
            _ => Some((h, m)),
        })?;

    let share = members.len() as f64 / events.len() as f64;
    if members.len() < min_frequency || share <= PEAK_HOUR_SHARE {
        return None;
    }

    let all: Vec<&FailureEvent> = events.iter().collect();
    let mut p = pattern(
        format!("time_pattern_{}h", hour),
        PatternType::Time,
        format!(
            "{} of {} failures occur around {:02}:00 UTC",
            members.len(),
            events.len(),
            hour
        ),
        &all,
        share,
    );
    p.frequency = members.len();
    Some(p)
}

/// Every (component, type) pair seen at least `min_frequency` times.
pub fn combination_patterns(events: &[FailureEvent], min_frequency: usize) -> Vec<FailurePattern> {
    let mut groups: BTreeMap<(&str, FailureType), Vec<&FailureEvent>> = BTreeMap::new();
    for event in events {
        groups
            .entry((event.component.as_str(), event.failure_type))
            .or_default()
            .push(event);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= min_frequency)
        .map(|((component, failure_type), members)| {
            pattern(
                format!("combo_{}_{}", component, failure_type),
                PatternType::Combination,
                format!("{} repeatedly fails with {}", component, failure_type),
                &members,
                (members.len() as f64 / events.len() as f64).min(1.0),
            )
        })
        .collect()
}

/// Runs of events each within `window_secs` of the previous one.
pub fn cascade_patterns(events: &[FailureEvent], window_secs: i64, min_frequency: usize) -> Vec<FailurePattern> {
    let mut sorted: Vec<&FailureEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let mut runs: Vec<Vec<&FailureEvent>> = Vec::new();
    let mut current: Vec<&FailureEvent> = Vec::new();
    for event in sorted {
        let joins = current
            .last()
            .is_some_and(|prev| (event.timestamp - prev.timestamp).num_seconds() <= window_secs);
        if !joins && !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
        current.push(event);
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let min_len = CASCADE_MIN_LENGTH.max(min_frequency);
    runs.into_iter()
        .filter(|run| run.len() >= min_len)
        .enumerate()
        .map(|(i, run)| {
            pattern(
                format!("cascade_{}", i),
                PatternType::Cascade,
                format!(
                    "Cascade of {} failures, each within {}s of the previous",
                    run.len(),
                    window_secs
                ),
                &run,
                0.8,
            )
        })
        .collect()
}

/// Fill in recovery outcome for the pattern's components and types.
pub fn enrich(pattern: &mut FailurePattern, attempts: &[RecoveryAttempt]) {
    let relevant: Vec<&RecoveryAttempt> = attempts
        .iter()
        .filter(|a| pattern.components.contains(&a.component) && pattern.failure_types.contains(&a.failure_type))
        .collect();
    if relevant.is_empty() {
        return;
    }

    let successes = relevant.iter().filter(|a| a.result == RecoveryResult::Success).count();
    pattern.recovery_success_rate = successes as f64 / relevant.len() as f64;

    let timed: Vec<f64> = relevant
        .iter()
        .map(|a| a.duration_secs)
        .filter(|d| *d > 0.0)
        .collect();
    if !timed.is_empty() {
        pattern.avg_recovery_minutes = timed.iter().sum::<f64>() / timed.len() as f64 / 60.0;
    }
}

/// All three passes, enriched.
pub fn detect(
    events: &[FailureEvent],
    attempts: &[RecoveryAttempt],
    min_frequency: usize,
    cascade_window_secs: i64,
) -> Vec<FailurePattern> {
    let mut patterns: Vec<FailurePattern> = time_pattern(events, min_frequency)
        .into_iter()
        .chain(combination_patterns(events, min_frequency))
        .chain(cascade_patterns(events, cascade_window_secs, min_frequency))
        .collect();
    for p in &mut patterns {
        enrich(p, attempts);
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecoveryAction, Severity};
    use chrono::{Duration, TimeZone};
    use std::time::Duration as StdDuration;

    fn at(ts: DateTime<Utc>, component: &str, failure_type: FailureType) -> FailureEvent {
        FailureEvent::new(failure_type, component, Severity::Medium, "x").at(ts)
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap()
    }

    #[test]
    fn peak_hour_needs_share_and_frequency() {
        let mut events: Vec<_> = (0..4)
            .map(|d| at(base() - Duration::days(d), "api", FailureType::ApiError))
            .collect();
        events.push(at(base() + Duration::hours(5), "db", FailureType::DatabaseConnection));
        events.push(at(base() + Duration::hours(8), "db", FailureType::DatabaseConnection));

        let p = time_pattern(&events, 3).unwrap();
        assert_eq!(p.pattern_id, "time_pattern_9h");
        assert_eq!(p.frequency, 4);
        assert!((p.confidence - 4.0 / 6.0).abs() < 1e-9);

        assert!(time_pattern(&events[..2], 3).is_none(), "below minimum frequency");
    }

    #[test]
    fn spread_out_hours_have_no_peak() {
        let events: Vec<_> = (0..10)
            .map(|h| at(base() + Duration::hours(h), "api", FailureType::ApiError))
            .collect();
        assert!(time_pattern(&events, 1).is_none());
    }

    #[test]
    fn combinations_at_minimum_frequency() {
        let mut events: Vec<_> = (0..3)
            .map(|d| at(base() - Duration::days(d), "api", FailureType::ApiTimeout))
            .collect();
        events.push(at(base(), "api", FailureType::ApiError));
        events.push(at(base(), "db", FailureType::ApiTimeout));

        let patterns = combination_patterns(&events, 3);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_id, "combo_api_api_timeout");
        assert_eq!(patterns[0].components, vec!["api".to_string()]);
        assert!((patterns[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn cascades_split_on_gaps() {
        let t = base();
        let events = vec![
            at(t, "db", FailureType::DatabaseConnection),
            at(t + Duration::seconds(120), "api", FailureType::ApiError),
            at(t + Duration::seconds(400), "web", FailureType::ServerUnresponsive),
            // gap
            at(t + Duration::hours(2), "db", FailureType::DatabaseConnection),
            at(t + Duration::hours(2) + Duration::seconds(60), "api", FailureType::ApiError),
        ];
        let patterns = cascade_patterns(&events, 300, 3);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_id, "cascade_0");
        assert_eq!(patterns[0].frequency, 3);
        assert_eq!(patterns[0].components, vec!["api", "db", "web"]);
        assert_eq!(patterns[0].first_seen, t);
        assert_eq!(patterns[0].confidence, 0.8);
    }

    #[test]
    fn enrichment_joins_matching_attempts() {
        let events: Vec<_> = (0..3)
            .map(|d| at(base() - Duration::days(d), "api", FailureType::ApiTimeout))
            .collect();
        let mut patterns = combination_patterns(&events, 3);

        let ok = RecoveryAttempt::new(
            &events[0],
            RecoveryAction::RestartService,
            RecoveryResult::Success,
            "ok",
            StdDuration::from_secs(120),
        );
        let failed = RecoveryAttempt::new(
            &events[1],
            RecoveryAction::ClearCache,
            RecoveryResult::Failed,
            "no",
            StdDuration::from_secs(60),
        );
        let other = RecoveryAttempt::new(
            &at(base(), "db", FailureType::ApiTimeout),
            RecoveryAction::RestartService,
            RecoveryResult::Success,
            "ok",
            StdDuration::from_secs(600),
        );

        enrich(&mut patterns[0], &[ok, failed, other]);
        assert!((patterns[0].recovery_success_rate - 0.5).abs() < 1e-9);
        assert!((patterns[0].avg_recovery_minutes - 1.5).abs() < 1e-9);
    }
}
