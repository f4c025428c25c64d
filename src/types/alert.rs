//! Alert types: AlertType, AlertPriority, AlertChannel, AlertMessage, AlertDelivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    FailureDetected,
    RecoverySuccess,
    RecoveryFailed,
    Escalation,
    SystemStatus,
    Maintenance,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FailureDetected => "failure_detected",
            AlertType::RecoverySuccess => "recovery_success",
            AlertType::RecoveryFailed => "recovery_failed",
            AlertType::Escalation => "escalation",
            AlertType::SystemStatus => "system_status",
            AlertType::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
    Emergency,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
            AlertPriority::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel. New transports are added here and in the dispatcher's registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    Chat,
    Email,
    Sms,
    Webhook,
    Log,
}

impl AlertChannel {
    pub const ALL: [AlertChannel; 5] = [
        AlertChannel::Chat,
        AlertChannel::Email,
        AlertChannel::Sms,
        AlertChannel::Webhook,
        AlertChannel::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Chat => "chat",
            AlertChannel::Email => "email",
            AlertChannel::Sms => "sms",
            AlertChannel::Webhook => "webhook",
            AlertChannel::Log => "log",
        }
    }
}

impl std::fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved alert, as persisted and handed to every transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertMessage {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub channels: Vec<AlertChannel>,
}

/// Outcome of delivering one alert over one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertDelivery {
    pub alert_id: Uuid,
    pub channel: AlertChannel,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub error: Option<String>,
}

/// Caller-side alert description; missing priority and channels are derived.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub component: String,
    pub priority: Option<AlertPriority>,
    pub channels: Option<Vec<AlertChannel>>,
    pub context: HashMap<String, serde_json::Value>,
}

impl AlertRequest {
    pub fn new(
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            title: title.into(),
            message: message.into(),
            component: component.into(),
            priority: None,
            channels: None,
            context: HashMap::new(),
        }
    }

    pub fn priority(mut self, priority: AlertPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn channels(mut self, channels: Vec<AlertChannel>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Per-channel delivery counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelStatistics {
    pub attempts: u64,
    pub successes: u64,
    pub avg_latency_ms: f64,
}

impl ChannelStatistics {
    pub fn record(&mut self, delivery: &AlertDelivery) {
        let n = self.attempts as f64;
        self.avg_latency_ms = (self.avg_latency_ms * n + delivery.latency_ms) / (n + 1.0);
        self.attempts += 1;
        if delivery.success {
            self.successes += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}
