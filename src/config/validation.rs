//! Unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is first parsed into a `toml::Value`, its key tree walked and
//! compared against the known field names. Unknown keys become warnings with
//! a "did you mean?" suggestion; they never fail a load. The same suggestion
//! logic serves runtime configuration updates.

use std::collections::HashSet;

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `AutohealConfig`.
///
/// Array-of-table entries use `[]`, e.g. `probes[].name`. Entries under the
/// free-form maps (`recovery.strategies`, `alerts.cooldowns`, header maps)
/// are checked by `validate()` instead.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "detector",
        "detector.poll_interval_secs",
        "detector.failure_threshold",
        "detector.probe_timeout_secs",
        "detector.error_backoff_secs",
        "detector.event_queue_capacity",
        "recovery",
        "recovery.cooldown_secs",
        "recovery.max_executions_per_hour",
        "recovery.action_timeout_secs",
        "recovery.strategies",
        "orchestrator",
        "orchestrator.poll_interval_secs",
        "orchestrator.error_backoff_secs",
        "alerts",
        "alerts.request_timeout_secs",
        "alerts.cooldowns",
        "alerts.chat",
        "alerts.chat.enabled",
        "alerts.chat.webhook_url",
        "alerts.chat.channel",
        "alerts.chat.username",
        "alerts.email",
        "alerts.email.enabled",
        "alerts.email.relay_url",
        "alerts.email.api_token",
        "alerts.email.from",
        "alerts.email.recipients",
        "alerts.sms",
        "alerts.sms.enabled",
        "alerts.sms.recipients",
        "alerts.webhook",
        "alerts.webhook.enabled",
        "alerts.webhook.url",
        "alerts.webhook.headers",
        "alerts.log",
        "alerts.log.enabled",
        "analytics",
        "analytics.min_pattern_frequency",
        "analytics.cascade_window_secs",
        "control",
        "control.enable_auto_recovery",
        "control.enable_alerts",
        "control.enable_analytics",
        "control.health_check_interval",
        "control.analytics_interval",
        "control.status_report_interval",
        "storage",
        "storage.data_dir",
        "server",
        "server.addr",
        "probes",
        "probes[].name",
        "probes[].kind",
        "probes[].url",
        "probes[].expected_status",
        "probes[].address",
        "probes[].interval_secs",
        "probes[].enabled",
        "actions",
        "actions[].action",
        "actions[].url",
        "actions[].headers",
    ];
    keys.iter().copied().collect()
}

/// Tables whose children are user-defined names rather than fields.
const FREE_FORM_TABLES: [&str; 4] = [
    "recovery.strategies",
    "alerts.cooldowns",
    "alerts.webhook.headers",
    "actions[].headers",
];

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect dotted key paths from a `toml::Value` tree.
///
/// A table `{ a = { b = 1 } }` yields `["a", "a.b"]`; an array of tables
/// `probes = [{ name = "x" }]` yields `["probes", "probes[].name"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if FREE_FORM_TABLES.contains(&prefix) {
        return keys;
    }
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    let item_prefix = format!("{path}[]");
                    for item in items.iter().filter(|i| i.is_table()) {
                        for key in walk_toml_keys(item, &item_prefix) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction<'a, I>(unknown: &str, known: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    known
        .into_iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(k, dist)| (*dist, *k))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse raw TOML and return a warning for every unknown key.
///
/// Parse errors are left to the serde pass that follows.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, known.iter().copied()),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
