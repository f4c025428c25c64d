//! Failure types: FailureType, Severity, FailureEvent, ComponentState

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Failure Classification
// ============================================================================

/// Closed set of failure categories a component can report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    ApiTimeout,
    ApiError,
    DatabaseConnection,
    ServerUnresponsive,
    WorkflowFailed,
    HighErrorRate,
    ResourceExhausted,
    WorkflowEngineError,
    AcceleratorError,
    ExternalApiError,
}

impl FailureType {
    pub const ALL: [FailureType; 10] = [
        FailureType::ApiTimeout,
        FailureType::ApiError,
        FailureType::DatabaseConnection,
        FailureType::ServerUnresponsive,
        FailureType::WorkflowFailed,
        FailureType::HighErrorRate,
        FailureType::ResourceExhausted,
        FailureType::WorkflowEngineError,
        FailureType::AcceleratorError,
        FailureType::ExternalApiError,
    ];

    /// Stable snake_case identifier, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::ApiTimeout => "api_timeout",
            FailureType::ApiError => "api_error",
            FailureType::DatabaseConnection => "database_connection",
            FailureType::ServerUnresponsive => "server_unresponsive",
            FailureType::WorkflowFailed => "workflow_failed",
            FailureType::HighErrorRate => "high_error_rate",
            FailureType::ResourceExhausted => "resource_exhausted",
            FailureType::WorkflowEngineError => "workflow_engine_error",
            FailureType::AcceleratorError => "accelerator_error",
            FailureType::ExternalApiError => "external_api_error",
        }
    }

    /// Failure type reported when a probe with this name crosses threshold.
    ///
    /// Probes not listed here are assumed to guard a server process.
    pub fn for_probe(probe_name: &str) -> Self {
        match probe_name {
            "local_api" => FailureType::ApiError,
            "gpu_server" => FailureType::AcceleratorError,
            "database" => FailureType::DatabaseConnection,
            "system_resources" => FailureType::ResourceExhausted,
            "workflow_engine" => FailureType::WorkflowEngineError,
            "external_api" => FailureType::ExternalApiError,
            _ => FailureType::ServerUnresponsive,
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown failure type '{}'", s))
    }
}

/// Failure severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity of a failure event created after `consecutive_failures` bad polls.
    pub fn from_consecutive_failures(consecutive_failures: u32) -> Self {
        match consecutive_failures {
            n if n >= 10 => Severity::Critical,
            n if n >= 6 => Severity::High,
            n if n >= 3 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Failure Events
// ============================================================================

/// Record created when a component's consecutive-failure count crosses threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEvent {
    pub id: Uuid,
    pub failure_type: FailureType,
    pub component: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolution_time: Option<DateTime<Utc>>,
}

impl FailureEvent {
    pub fn new(
        failure_type: FailureType,
        component: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            failure_type,
            component: component.into(),
            severity,
            message: message.into(),
            timestamp: Utc::now(),
            context: HashMap::new(),
            resolved: false,
            resolution_time: None,
        }
    }

    /// Attach a context entry (builder style).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Override the creation timestamp (history import and tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn mark_resolved(&mut self, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolution_time = Some(at);
    }

    /// Minutes between creation and resolution, if resolved.
    pub fn resolution_minutes(&self) -> Option<f64> {
        self.resolution_time
            .map(|r| (r - self.timestamp).num_milliseconds() as f64 / 60_000.0)
    }
}

// ============================================================================
// Component State
// ============================================================================

/// Health status of a monitored component as last observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Unknown => write!(f, "unknown"),
            ComponentStatus::Healthy => write!(f, "healthy"),
            ComponentStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Persisted per-component detector state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentState {
    pub component: String,
    pub status: ComponentStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub total_failures: u64,
    pub uptime_start: Option<DateTime<Utc>>,
}

impl ComponentState {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: ComponentStatus::Unknown,
            last_check: None,
            consecutive_failures: 0,
            last_failure_time: None,
            total_failures: 0,
            uptime_start: None,
        }
    }
}
