//! Alert routing tables: type → priority, priority → channels, type → cooldown

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{AlertChannel, AlertPriority, AlertType};

/// Priority used when the caller does not give one.
///
/// Failure alerts follow the failure's `severity` context entry.
pub fn derive_priority(alert_type: AlertType, context: &HashMap<String, serde_json::Value>) -> AlertPriority {
    match alert_type {
        AlertType::Escalation => AlertPriority::Critical,
        AlertType::FailureDetected => match context.get("severity").and_then(serde_json::Value::as_str) {
            Some("critical") => AlertPriority::Critical,
            Some("high") => AlertPriority::High,
            Some("low") => AlertPriority::Low,
            _ => AlertPriority::Medium,
        },
        AlertType::RecoveryFailed => AlertPriority::High,
        AlertType::RecoverySuccess => AlertPriority::Low,
        AlertType::SystemStatus => AlertPriority::Medium,
        AlertType::Maintenance => AlertPriority::Low,
    }
}

/// Channels an alert of this priority fans out to.
pub fn channels_for(priority: AlertPriority) -> Vec<AlertChannel> {
    match priority {
        AlertPriority::Low => vec![AlertChannel::Log],
        AlertPriority::Medium => vec![AlertChannel::Log, AlertChannel::Chat],
        AlertPriority::High => vec![AlertChannel::Log, AlertChannel::Chat, AlertChannel::Email],
        AlertPriority::Critical | AlertPriority::Emergency => AlertChannel::ALL.to_vec(),
    }
}

/// Suppression window for repeat alerts of one type about one component.
pub fn default_cooldown(alert_type: AlertType) -> Duration {
    let secs = match alert_type {
        AlertType::FailureDetected => 300,
        AlertType::RecoveryFailed => 600,
        AlertType::Escalation => 60,
        AlertType::RecoverySuccess => 60,
        AlertType::SystemStatus => 1_800,
        AlertType::Maintenance => 3_600,
    };
    Duration::from_secs(secs)
}
