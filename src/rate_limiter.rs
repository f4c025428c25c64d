//! Keyed cooldown and hourly-cap tracker
//!
//! Used by the recovery engine, keyed by (component, action), and by the
//! alert dispatcher, keyed by (alert type, component) with a per-type window.
//! Times are `tokio::time::Instant` so paused-clock tests can advance them.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

const HOUR: Duration = Duration::from_secs(3_600);

/// Why a key may not fire right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    /// Last firing was too recent
    CoolingDown { remaining: Duration },
    /// The rolling-hour cap is spent
    HourlyCapReached { count: u32 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Rate limiter that prevents spam by enforcing per-key cooldowns and an
/// optional per-key cap on firings in any rolling hour.
pub struct RateLimiter<K> {
    cooldown: Duration,
    max_per_hour: Option<u32>,
    history: HashMap<K, VecDeque<Instant>>,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(cooldown: Duration, max_per_hour: Option<u32>) -> Self {
        Self {
            cooldown,
            max_per_hour,
            history: HashMap::new(),
        }
    }

    /// Check `key` against the limiter's own cooldown.
    pub fn check(&self, key: &K, now: Instant) -> RateLimitDecision {
        self.check_with(key, self.cooldown, now)
    }

    /// Check `key` against an explicit cooldown (hourly cap still applies).
    pub fn check_with(&self, key: &K, cooldown: Duration, now: Instant) -> RateLimitDecision {
        let Some(fired) = self.history.get(key) else {
            return RateLimitDecision::Allowed;
        };

        if let Some(last) = fired.back() {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < cooldown {
                return RateLimitDecision::CoolingDown {
                    remaining: cooldown - elapsed,
                };
            }
        }

        if let Some(cap) = self.max_per_hour {
            let count = fired
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < HOUR)
                .count() as u32;
            if count >= cap {
                return RateLimitDecision::HourlyCapReached { count };
            }
        }

        RateLimitDecision::Allowed
    }

    /// Record that `key` fired at `now`. Entries older than an hour are pruned.
    pub fn record(&mut self, key: K, now: Instant) {
        let fired = self.history.entry(key).or_default();
        while fired.front().is_some_and(|t| now.saturating_duration_since(*t) >= HOUR) {
            fired.pop_front();
        }
        fired.push_back(now);
    }

    /// Time since `key` last fired.
    pub fn since_last(&self, key: &K, now: Instant) -> Option<Duration> {
        self.history
            .get(key)
            .and_then(|fired| fired.back())
            .map(|last| now.saturating_duration_since(*last))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(component: &str) -> (String, &'static str) {
        (component.to_string(), "restart_service")
    }

    #[test]
    fn allows_first_firing() {
        let limiter = RateLimiter::new(Duration::from_secs(60), Some(3));
        assert!(limiter.check(&key("api"), Instant::now()).is_allowed());
    }

    #[test]
    fn suppresses_within_cooldown() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), Some(3));
        let t0 = Instant::now();
        limiter.record(key("api"), t0);
        assert_eq!(
            limiter.check(&key("api"), t0 + Duration::from_secs(20)),
            RateLimitDecision::CoolingDown {
                remaining: Duration::from_secs(40)
            }
        );
        assert!(limiter.check(&key("api"), t0 + Duration::from_secs(60)).is_allowed());
    }

    #[test]
    fn keys_are_independent() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), None);
        let t0 = Instant::now();
        limiter.record(key("api"), t0);
        assert!(limiter.check(&key("db"), t0).is_allowed());
    }

    #[test]
    fn hourly_cap_applies_after_cooldowns_pass() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), Some(3));
        let t0 = Instant::now();
        for i in 0..3 {
            limiter.record(key("api"), t0 + Duration::from_secs(i * 120));
        }
        let after_third = t0 + Duration::from_secs(400);
        assert_eq!(
            limiter.check(&key("api"), after_third),
            RateLimitDecision::HourlyCapReached { count: 3 }
        );
        // First firing ages out of the rolling hour
        assert!(limiter.check(&key("api"), t0 + Duration::from_secs(3_601)).is_allowed());
    }

    #[test]
    fn explicit_cooldown_overrides_default() {
        let mut limiter = RateLimiter::new(Duration::from_secs(300), None);
        let t0 = Instant::now();
        limiter.record(key("api"), t0);
        let later = t0 + Duration::from_secs(90);
        assert!(!limiter.check(&key("api"), later).is_allowed());
        assert!(limiter.check_with(&key("api"), Duration::from_secs(60), later).is_allowed());
        assert_eq!(limiter.since_last(&key("api"), later), Some(Duration::from_secs(90)));
    }
}
