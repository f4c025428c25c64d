//! Remedial action executors
//!
//! The engine only knows actions by name; what "restart the service" means
//! is supplied by the host through [`RecoveryActionExecutor`]. The crate
//! ships one implementation, [`HttpActionExecutor`], which POSTs the failure
//! event to a remediation hook.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::{FailureEvent, RecoveryAction, RecoveryResult};

/// What an executor reports when it did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub result: RecoveryResult,
    pub message: String,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            result: RecoveryResult::Success,
            message: message.into(),
        }
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self {
            result: RecoveryResult::PartialSuccess,
            message: message.into(),
        }
    }

    pub fn retry_needed(message: impl Into<String>) -> Self {
        Self {
            result: RecoveryResult::RetryNeeded,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remediation hook returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("{0}")]
    Failed(String),
}

/// Executes one named remedial action against the failing component.
#[async_trait]
pub trait RecoveryActionExecutor: Send + Sync {
    async fn execute(&self, event: &FailureEvent) -> Result<ActionOutcome, ActionError>;
}

/// POST `{action, event}` to a remediation hook.
///
/// 200/201/204 mean the action completed, 202 means the hook accepted it but
/// could not confirm the outcome (partial success). Anything else is a failure.
pub struct HttpActionExecutor {
    http: reqwest::Client,
    action: RecoveryAction,
    url: String,
    headers: BTreeMap<String, String>,
}

impl HttpActionExecutor {
    pub fn new(
        action: RecoveryAction,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ActionError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            action,
            url: url.into(),
            headers,
        })
    }
}

#[async_trait]
impl RecoveryActionExecutor for HttpActionExecutor {
    async fn execute(&self, event: &FailureEvent) -> Result<ActionOutcome, ActionError> {
        let body = serde_json::json!({
            "action": self.action,
            "component": event.component,
            "failure_type": event.failure_type,
            "event": event,
        });
        let mut request = self.http.post(&self.url).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let resp = request.send().await?;

        match resp.status() {
            reqwest::StatusCode::ACCEPTED => Ok(ActionOutcome::partial(format!(
                "{} accepted by {}",
                self.action, self.url
            ))),
            status if status.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                let message = if text.trim().is_empty() {
                    format!("{} completed", self.action)
                } else {
                    text.chars().take(200).collect()
                };
                Ok(ActionOutcome::success(message))
            }
            status => Err(ActionError::Status(status)),
        }
    }
}
