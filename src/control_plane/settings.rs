//! Runtime configuration updates for the `[control]` section

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::validation::suggest_correction;
use crate::config::ControlSettings;

/// Key rejected by `update_configuration`, with the reason.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IgnoredKey {
    pub key: String,
    pub reason: String,
}

/// What an update did. Never an error: bad keys are reported, not fatal.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub applied: Vec<String>,
    pub ignored: Vec<IgnoredKey>,
}

impl ConfigUpdate {
    fn ignore(&mut self, key: &str, reason: impl Into<String>) {
        self.ignored.push(IgnoredKey {
            key: key.to_string(),
            reason: reason.into(),
        });
    }
}

/// Fold `updates` over `current`, returning the new settings and the report.
pub fn apply_updates(current: &ControlSettings, updates: &Map<String, Value>) -> (ControlSettings, ConfigUpdate) {
    let mut next = current.clone();
    let mut report = ConfigUpdate::default();

    for (key, value) in updates {
        let flag = match key.as_str() {
            "enable_auto_recovery" => Some(&mut next.enable_auto_recovery),
            "enable_alerts" => Some(&mut next.enable_alerts),
            "enable_analytics" => Some(&mut next.enable_analytics),
            _ => None,
        };
        if let Some(flag) = flag {
            match value.as_bool() {
                Some(b) => {
                    *flag = b;
                    report.applied.push(key.clone());
                }
                None => report.ignore(key, "expected a boolean"),
            }
            continue;
        }

        let interval = match key.as_str() {
            "health_check_interval" => Some(&mut next.health_check_interval),
            "analytics_interval" => Some(&mut next.analytics_interval),
            "status_report_interval" => Some(&mut next.status_report_interval),
            _ => None,
        };
        if let Some(interval) = interval {
            match value.as_u64().filter(|secs| *secs > 0) {
                Some(secs) => {
                    *interval = secs;
                    report.applied.push(key.clone());
                }
                None => report.ignore(key, "expected a positive integer (seconds)"),
            }
            continue;
        }

        let reason = match suggest_correction(key, ControlSettings::KEYS.iter().copied()) {
            Some(s) => format!("unknown key (did you mean '{}'?)", s),
            None => "unknown key".to_string(),
        };
        report.ignore(key, reason);
    }

    (next, report)
}
