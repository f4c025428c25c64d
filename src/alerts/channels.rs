//! Notification transports
//!
//! One [`NotificationTransport`] per [`AlertChannel`]. Each transport reports
//! whether it is configured; the dispatcher turns an unconfigured channel into
//! a failed delivery instead of calling it.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::defaults::CHAT_MAX_FIELDS;
use crate::config::{ChatChannelConfig, EmailChannelConfig, SmsChannelConfig, WebhookChannelConfig};
use crate::types::{AlertChannel, AlertMessage, AlertPriority};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Channel not enabled or configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn channel(&self) -> AlertChannel;

    fn is_enabled(&self) -> bool;

    /// Deliver one alert. The `Ok` string is a short delivery note.
    async fn send(&self, alert: &AlertMessage) -> Result<String, NotifyError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, NotifyError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn check_status(resp: &reqwest::Response) -> Result<(), NotifyError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(NotifyError::Status(resp.status()))
    }
}

// ============================================================================
// Chat (Slack-compatible incoming webhook)
// ============================================================================

pub struct ChatTransport {
    http: reqwest::Client,
    config: ChatChannelConfig,
}

impl ChatTransport {
    pub fn new(config: ChatChannelConfig, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    fn style(priority: AlertPriority) -> (&'static str, &'static str) {
        match priority {
            AlertPriority::Emergency => ("#FF0000", "🚨"),
            AlertPriority::Critical => ("#FF4500", "🔥"),
            AlertPriority::High => ("#FFA500", "⚠️"),
            AlertPriority::Medium => ("#FFFF00", "⚡"),
            AlertPriority::Low => ("#00FF00", "ℹ️"),
        }
    }

    fn title_case(key: &str) -> String {
        key.split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the webhook payload: headline text plus one colored attachment.
    pub fn payload(&self, alert: &AlertMessage) -> Value {
        let (color, emoji) = Self::style(alert.priority);

        let mut fields = vec![
            json!({"title": "Message", "value": alert.message, "short": false}),
            json!({"title": "Component", "value": alert.component, "short": true}),
            json!({"title": "Priority", "value": alert.priority.as_str().to_uppercase(), "short": true}),
            json!({"title": "Time", "value": alert.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), "short": true}),
        ];

        let mut context: Vec<_> = alert.context.iter().collect();
        context.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in context {
            if fields.len() >= CHAT_MAX_FIELDS {
                break;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.push(json!({"title": Self::title_case(key), "value": value, "short": true}));
        }

        let mut payload = json!({
            "text": format!("{} *{}*", emoji, alert.title),
            "attachments": [{"color": color, "fields": fields}],
        });
        if let Some(channel) = &self.config.channel {
            payload["channel"] = json!(channel);
        }
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        payload
    }
}

#[async_trait]
impl NotificationTransport for ChatTransport {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Chat
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    async fn send(&self, alert: &AlertMessage) -> Result<String, NotifyError> {
        let resp = self
            .http
            .post(&self.config.webhook_url)
            .json(&self.payload(alert))
            .send()
            .await?;
        check_status(&resp)?;
        Ok("Chat notification sent".to_string())
    }
}

// ============================================================================
// Email (HTTP mail relay)
// ============================================================================

pub struct EmailTransport {
    http: reqwest::Client,
    config: EmailChannelConfig,
}

impl EmailTransport {
    pub fn new(config: EmailChannelConfig, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    fn body(alert: &AlertMessage) -> String {
        let mut text = format!(
            "{}\n\nComponent: {}\nPriority: {}\nType: {}\nTime: {}\n",
            alert.message,
            alert.component,
            alert.priority.as_str().to_uppercase(),
            alert.alert_type,
            alert.timestamp.to_rfc3339(),
        );
        if !alert.context.is_empty() {
            text.push_str("\nContext:\n");
            let mut context: Vec<_> = alert.context.iter().collect();
            context.sort_by(|a, b| a.0.cmp(b.0));
            for (k, v) in context {
                text.push_str(&format!("  {}: {}\n", k, v));
            }
        }
        text
    }
}

#[async_trait]
impl NotificationTransport for EmailTransport {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Email
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.relay_url.is_empty() && !self.config.recipients.is_empty()
    }

    async fn send(&self, alert: &AlertMessage) -> Result<String, NotifyError> {
        let subject = format!("[{}] {}", alert.priority.as_str().to_uppercase(), alert.title);
        let mut request = self.http.post(&self.config.relay_url).json(&json!({
            "from": self.config.from,
            "to": self.config.recipients,
            "subject": subject,
            "text": Self::body(alert),
        }));
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;
        check_status(&resp)?;
        Ok(format!("Email sent to {} recipients", self.config.recipients.len()))
    }
}

// ============================================================================
// SMS (no gateway integration; always reports unconfigured)
// ============================================================================

pub struct SmsTransport {
    config: SmsChannelConfig,
}

impl SmsTransport {
    pub fn new(config: SmsChannelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationTransport for SmsTransport {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Sms
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn send(&self, _alert: &AlertMessage) -> Result<String, NotifyError> {
        if self.config.enabled {
            warn!(recipients = self.config.recipients.len(), "SMS channel enabled but no gateway is available");
        }
        Err(NotifyError::NotConfigured)
    }
}

// ============================================================================
// Generic webhook
// ============================================================================

pub struct WebhookTransport {
    http: reqwest::Client,
    config: WebhookChannelConfig,
}

impl WebhookTransport {
    pub fn new(config: WebhookChannelConfig, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.config.headers
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Webhook
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, alert: &AlertMessage) -> Result<String, NotifyError> {
        let mut request = self.http.post(&self.config.url).json(alert);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let resp = request.send().await?;
        check_status(&resp)?;
        Ok(format!("Webhook delivered ({})", resp.status().as_u16()))
    }
}

// ============================================================================
// Log
// ============================================================================

pub struct LogTransport {
    enabled: bool,
}

impl LogTransport {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl NotificationTransport for LogTransport {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Log
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, alert: &AlertMessage) -> Result<String, NotifyError> {
        match alert.priority {
            AlertPriority::Low => info!(
                alert_type = %alert.alert_type,
                component = %alert.component,
                "[ALERT] {}: {}", alert.title, alert.message
            ),
            AlertPriority::Medium | AlertPriority::High => warn!(
                alert_type = %alert.alert_type,
                component = %alert.component,
                priority = %alert.priority,
                "[ALERT] {}: {}", alert.title, alert.message
            ),
            AlertPriority::Critical | AlertPriority::Emergency => error!(
                alert_type = %alert.alert_type,
                component = %alert.component,
                priority = %alert.priority,
                "[ALERT] {}: {}", alert.title, alert.message
            ),
        }
        Ok("Logged".to_string())
    }
}
