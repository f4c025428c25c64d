//! Health probes: the capability the detector polls for each component
//!
//! A probe answers in whichever shape is natural for it: a plain boolean, a
//! JSON map carrying a `"healthy"` field, or a full [`HealthCheckResult`].
//! [`ProbeOutcome::is_healthy`] normalizes all three.
//!
//! Two concrete probes ship with the crate for the binary's config-declared
//! checks: [`HttpProbe`] and [`TcpProbe`]. Anything richer is supplied by the
//! host application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Component health status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is operating normally
    Healthy,
    /// Component is running but with reduced capability
    Warning { reason: String },
    /// Component is not operational
    Critical { reason: String },
    /// The probe could not tell
    Unknown { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Warning { reason } => write!(f, "WARNING: {}", reason),
            HealthStatus::Critical { reason } => write!(f, "CRITICAL: {}", reason),
            HealthStatus::Unknown { reason } => write!(f, "UNKNOWN: {}", reason),
        }
    }
}

/// Structured probe answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Critical { reason: reason.into() },
            response_time_ms: None,
            details: serde_json::Value::Null,
        }
    }
}

/// Anything a probe may return.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Flag(bool),
    Map(serde_json::Value),
    Check(HealthCheckResult),
}

impl ProbeOutcome {
    /// Healthy and warning count as up, critical and unknown as down. A map
    /// without a boolean `"healthy"` field counts as down.
    pub fn is_healthy(&self) -> bool {
        match self {
            ProbeOutcome::Flag(ok) => *ok,
            ProbeOutcome::Map(value) => value.get("healthy").and_then(serde_json::Value::as_bool).unwrap_or(false),
            ProbeOutcome::Check(result) => {
                matches!(result.status, HealthStatus::Healthy | HealthStatus::Warning { .. })
            }
        }
    }

    /// JSON form stored in a failure event's context.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ProbeOutcome::Flag(ok) => serde_json::Value::Bool(*ok),
            ProbeOutcome::Map(value) => value.clone(),
            ProbeOutcome::Check(result) => serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<bool> for ProbeOutcome {
    fn from(ok: bool) -> Self {
        ProbeOutcome::Flag(ok)
    }
}

impl From<HealthCheckResult> for ProbeOutcome {
    fn from(result: HealthCheckResult) -> Self {
        ProbeOutcome::Check(result)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe transport error: {0}")]
    Transport(String),
    #[error("probe failed: {0}")]
    Other(String),
}

/// Health check for one monitored component.
///
/// Returning `Err` is equivalent to an unhealthy answer; it never stops the
/// detector loop.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<ProbeOutcome, ProbeError>;
}

// ============================================================================
// Built-in Probes
// ============================================================================

/// GET a URL; healthy on the expected status (any 2xx when unset).
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    expected_status: Option<u16>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, expected_status: Option<u16>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            expected_status,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> Result<ProbeOutcome, ProbeError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        let status = response.status();
        let ok = match self.expected_status {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        Ok(ProbeOutcome::Check(HealthCheckResult {
            status: if ok {
                HealthStatus::Healthy
            } else {
                HealthStatus::Critical {
                    reason: format!("HTTP {}", status.as_u16()),
                }
            },
            response_time_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
            details: serde_json::json!({ "url": self.url, "status": status.as_u16() }),
        }))
    }
}

/// Healthy when a TCP connection can be opened.
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> Result<ProbeOutcome, ProbeError> {
        match tokio::net::TcpStream::connect(&self.address).await {
            Ok(_) => Ok(ProbeOutcome::Flag(true)),
            Err(e) => Ok(ProbeOutcome::Check(HealthCheckResult::unhealthy(format!(
                "connect {}: {}",
                self.address, e
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_shapes_normalize() {
        assert!(ProbeOutcome::from(true).is_healthy());
        assert!(!ProbeOutcome::from(false).is_healthy());
        assert!(ProbeOutcome::Map(json!({"healthy": true, "latency": 3})).is_healthy());
        assert!(!ProbeOutcome::Map(json!({"healthy": false})).is_healthy());
        assert!(!ProbeOutcome::Map(json!({"status": "ok"})).is_healthy());
        assert!(ProbeOutcome::from(HealthCheckResult::healthy()).is_healthy());
        assert!(!ProbeOutcome::from(HealthCheckResult::unhealthy("down")).is_healthy());
        let warning = HealthCheckResult {
            status: HealthStatus::Warning { reason: "slow".into() },
            response_time_ms: Some(900.0),
            details: serde_json::Value::Null,
        };
        assert!(ProbeOutcome::from(warning).is_healthy());
    }

    #[test]
    fn unknown_status_counts_as_down() {
        let result: HealthCheckResult = serde_json::from_value(json!({
            "status": {"state": "unknown", "reason": "no metrics yet"},
            "response_time_ms": null,
        }))
        .unwrap();
        assert_eq!(result.status, HealthStatus::Unknown { reason: "no metrics yet".into() });
        assert!(!ProbeOutcome::from(result).is_healthy());

        let critical: HealthCheckResult = serde_json::from_value(json!({
            "status": {"state": "critical", "reason": "disk full"},
            "response_time_ms": 12.0,
        }))
        .unwrap();
        assert!(!ProbeOutcome::from(critical).is_healthy());
    }

    #[tokio::test]
    async fn tcp_probe_reports_refused_connection_as_unhealthy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let up = TcpProbe::new(addr.to_string());
        assert!(up.check().await.unwrap().is_healthy());

        drop(listener);
        let down = TcpProbe::new(addr.to_string());
        assert!(!down.check().await.unwrap().is_healthy());
    }
}
