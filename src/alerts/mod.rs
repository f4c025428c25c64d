//! Alert Dispatcher: typed alerts with priority routing and cooldown suppression
//!
//! ```text
//! AlertRequest ──▶ derive priority ──▶ derive channels ──▶ cooldown check
//!                                                              │
//!                        persist alert ◀───────────────────────┘
//!                              │
//!              ┌───────┬───────┼────────┬─────────┐
//!              ▼       ▼       ▼        ▼         ▼
//!            chat    email    sms    webhook     log     (concurrently)
//!              └───────┴───────┴────────┴─────────┘
//!                              │
//!                 deliveries persisted + per-channel stats
//! ```
//!
//! A repeat alert for the same (type, component) inside that type's window
//! is dropped before anything is persisted. One channel failing never stops
//! the others; its failure becomes a delivery with `success = false`.

mod channels;
mod routing;

pub use channels::*;
pub use routing::*;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{parse_alert_type, AlertsConfig};
use crate::rate_limiter::RateLimiter;
use crate::storage::{StorageError, Store};
use crate::types::{
    AlertChannel, AlertDelivery, AlertMessage, AlertPriority, AlertRequest, AlertType, ChannelStatistics,
    FailureEvent, RecoverySession,
};

/// Alert volume and delivery health over a window.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
    pub period_days: u32,
    pub total_alerts: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<AlertPriority, usize>,
    pub total_deliveries: usize,
    pub successful_deliveries: usize,
    pub delivery_rate: f64,
    /// In-process counters since startup
    pub channels: BTreeMap<AlertChannel, ChannelStatistics>,
}

pub struct AlertDispatcher {
    store: Store,
    transports: RwLock<HashMap<AlertChannel, Arc<dyn NotificationTransport>>>,
    limiter: Mutex<RateLimiter<(AlertType, String)>>,
    cooldowns: HashMap<AlertType, Duration>,
    channel_stats: Mutex<BTreeMap<AlertChannel, ChannelStatistics>>,
    enabled: AtomicBool,
}

impl AlertDispatcher {
    /// Build the dispatcher with one transport per configured channel.
    pub fn new(config: &AlertsConfig, store: Store) -> Result<Self, NotifyError> {
        let timeout = config.request_timeout();
        let transports: Vec<Arc<dyn NotificationTransport>> = vec![
            Arc::new(ChatTransport::new(config.chat.clone(), timeout)?),
            Arc::new(EmailTransport::new(config.email.clone(), timeout)?),
            Arc::new(SmsTransport::new(config.sms.clone())),
            Arc::new(WebhookTransport::new(config.webhook.clone(), timeout)?),
            Arc::new(LogTransport::new(config.log.enabled)),
        ];

        let cooldowns = config
            .cooldown_overrides()
            .into_iter()
            .filter_map(|(name, window)| parse_alert_type(&name).map(|t| (t, window)))
            .collect();

        Ok(Self::with_transports(store, transports, cooldowns))
    }

    pub fn with_transports(
        store: Store,
        transports: Vec<Arc<dyn NotificationTransport>>,
        cooldowns: HashMap<AlertType, Duration>,
    ) -> Self {
        let transports = transports.into_iter().map(|t| (t.channel(), t)).collect();
        Self {
            store,
            transports: RwLock::new(transports),
            limiter: Mutex::new(RateLimiter::new(Duration::ZERO, None)),
            cooldowns,
            channel_stats: Mutex::new(BTreeMap::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Replace the transport for its channel.
    pub async fn register_transport(&self, transport: Arc<dyn NotificationTransport>) {
        info!(channel = %transport.channel(), "Alert transport registered");
        self.transports.write().await.insert(transport.channel(), transport);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Channels whose transport is registered and enabled.
    pub async fn enabled_channels(&self) -> Vec<AlertChannel> {
        let mut channels: Vec<_> = self
            .transports
            .read()
            .await
            .values()
            .filter(|t| t.is_enabled())
            .map(|t| t.channel())
            .collect();
        channels.sort();
        channels
    }

    pub fn cooldown_for(&self, alert_type: AlertType) -> Duration {
        self.cooldowns
            .get(&alert_type)
            .copied()
            .unwrap_or_else(|| default_cooldown(alert_type))
    }

    /// Route and deliver one alert. Empty when disabled or suppressed.
    pub async fn send(&self, request: AlertRequest) -> Vec<AlertDelivery> {
        if !self.is_enabled() {
            debug!(alert_type = %request.alert_type, "Alerts disabled, dropping");
            return Vec::new();
        }

        let key = (request.alert_type, request.component.clone());
        let cooldown = self.cooldown_for(request.alert_type);
        {
            let limiter = self.limiter.lock().await;
            let decision = limiter.check_with(&key, cooldown, Instant::now());
            if !decision.is_allowed() {
                debug!(
                    alert_type = %request.alert_type,
                    component = %request.component,
                    ?decision,
                    "Alert suppressed by cooldown"
                );
                return Vec::new();
            }
        }

        let priority = request
            .priority
            .unwrap_or_else(|| derive_priority(request.alert_type, &request.context));
        let channels = request.channels.unwrap_or_else(|| channels_for(priority));
        let alert = AlertMessage {
            id: Uuid::new_v4(),
            alert_type: request.alert_type,
            priority,
            title: request.title,
            message: request.message,
            component: request.component,
            timestamp: Utc::now(),
            context: request.context,
            channels,
        };

        if let Err(e) = self.store.save_alert(&alert) {
            error!(alert_id = %alert.id, error = %e, "Failed to persist alert");
        }

        let transports = self.transports.read().await.clone();
        let deliveries = futures::future::join_all(
            alert
                .channels
                .iter()
                .map(|channel| Self::deliver(transports.get(channel).cloned(), *channel, &alert)),
        )
        .await;

        {
            let mut stats = self.channel_stats.lock().await;
            for delivery in &deliveries {
                stats.entry(delivery.channel).or_default().record(delivery);
                if let Err(e) = self.store.save_delivery(delivery) {
                    error!(alert_id = %alert.id, channel = %delivery.channel, error = %e, "Failed to persist delivery");
                }
            }
        }

        self.limiter.lock().await.record(key, Instant::now());

        let delivered = deliveries.iter().filter(|d| d.success).count();
        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            priority = %alert.priority,
            component = %alert.component,
            delivered,
            channels = deliveries.len(),
            "Alert dispatched"
        );
        deliveries
    }

    async fn deliver(
        transport: Option<Arc<dyn NotificationTransport>>,
        channel: AlertChannel,
        alert: &AlertMessage,
    ) -> AlertDelivery {
        let started = Instant::now();
        let result = match transport {
            Some(t) if t.is_enabled() => t.send(alert).await,
            _ => Err(NotifyError::NotConfigured),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(message) => AlertDelivery {
                alert_id: alert.id,
                channel,
                success: true,
                message,
                timestamp: Utc::now(),
                latency_ms,
                error: None,
            },
            Err(e) => {
                if !matches!(e, NotifyError::NotConfigured) {
                    warn!(alert_id = %alert.id, channel = %channel, error = %e, "Alert delivery failed");
                }
                AlertDelivery {
                    alert_id: alert.id,
                    channel,
                    success: false,
                    message: format!("Delivery over {} failed", channel),
                    timestamp: Utc::now(),
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    // ========================================================================
    // Typed helpers used by the orchestrator and control plane
    // ========================================================================

    pub async fn send_failure_alert(&self, event: &FailureEvent) -> Vec<AlertDelivery> {
        let mut request = AlertRequest::new(
            AlertType::FailureDetected,
            format!("Failure detected: {}", event.component),
            event.message.clone(),
            event.component.clone(),
        )
        .context("failure_type", event.failure_type.as_str())
        .context("severity", event.severity.as_str())
        .context("event_id", event.id.to_string());
        if let Some(n) = event.context.get("consecutive_failures") {
            request = request.context("consecutive_failures", n.clone());
        }
        self.send(request).await
    }

    pub async fn send_recovery_success_alert(&self, session: &RecoverySession) -> Vec<AlertDelivery> {
        let action = session
            .attempts
            .iter()
            .rev()
            .find(|a| a.is_success())
            .map(|a| a.action.as_str())
            .unwrap_or("unknown");
        let request = AlertRequest::new(
            AlertType::RecoverySuccess,
            format!("Recovered: {}", session.component()),
            format!(
                "{} resolved by {} during stage {} after {} attempts",
                session.failure_type(),
                action,
                session.current_stage.as_str(),
                session.total_attempts
            ),
            session.component(),
        )
        .context("session_id", session.session_id.clone())
        .context("failure_type", session.failure_type().as_str())
        .context("total_attempts", session.total_attempts);
        self.send(request).await
    }

    pub async fn send_recovery_failed_alert(&self, session: &RecoverySession, reason: &str) -> Vec<AlertDelivery> {
        let request = AlertRequest::new(
            AlertType::RecoveryFailed,
            format!("Recovery stage failed: {}", session.component()),
            reason.to_string(),
            session.component(),
        )
        .context("session_id", session.session_id.clone())
        .context("stage", session.current_stage.as_str())
        .context("total_attempts", session.total_attempts);
        self.send(request).await
    }

    pub async fn send_escalation_alert(&self, session: &RecoverySession, reason: &str) -> Vec<AlertDelivery> {
        let request = AlertRequest::new(
            AlertType::Escalation,
            format!("Escalation: {} needs attention", session.component()),
            format!(
                "{} on {} could not be recovered automatically: {}",
                session.failure_type(),
                session.component(),
                reason
            ),
            session.component(),
        )
        .priority(AlertPriority::Critical)
        .context("session_id", session.session_id.clone())
        .context("failure_type", session.failure_type().as_str())
        .context("total_attempts", session.total_attempts)
        .context("reason", reason);
        self.send(request).await
    }

    /// Status alert from the control plane. `source` keys the cooldown, so
    /// the watchdog, the scheduler and shutdown never suppress each other.
    pub async fn send_system_status(
        &self,
        source: &str,
        title: impl Into<String>,
        message: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Vec<AlertDelivery> {
        let mut request = AlertRequest::new(AlertType::SystemStatus, title, message, source);
        request.context = context;
        self.send(request).await
    }

    /// Persisted alert volume over `days`, plus in-process channel counters.
    pub async fn statistics(&self, days: u32) -> Result<AlertStatistics, StorageError> {
        let since = Utc::now() - ChronoDuration::days(i64::from(days));
        let alerts = self.store.alerts_since(since)?;

        let mut by_type = BTreeMap::new();
        let mut by_priority = BTreeMap::new();
        let mut total_deliveries = 0;
        let mut successful_deliveries = 0;
        for alert in &alerts {
            *by_type.entry(alert.alert_type.as_str().to_string()).or_insert(0) += 1;
            *by_priority.entry(alert.priority).or_insert(0) += 1;
            let deliveries = self.store.deliveries_for(alert.id)?;
            total_deliveries += deliveries.len();
            successful_deliveries += deliveries.iter().filter(|d| d.success).count();
        }

        Ok(AlertStatistics {
            period_days: days,
            total_alerts: alerts.len(),
            by_type,
            by_priority,
            total_deliveries,
            successful_deliveries,
            delivery_rate: if total_deliveries == 0 {
                0.0
            } else {
                successful_deliveries as f64 / total_deliveries as f64
            },
            channels: self.channel_stats.lock().await.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureType, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Counts sends; fails when `fail` is set.
    struct Recording {
        channel: AlertChannel,
        fail: bool,
        sent: AtomicUsize,
    }

    impl Recording {
        fn new(channel: AlertChannel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail,
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationTransport for Recording {
        fn channel(&self) -> AlertChannel {
            self.channel
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, _alert: &AlertMessage) -> Result<String, NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Timeout(Duration::from_secs(10)))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn failure_request(component: &str) -> AlertRequest {
        AlertRequest::new(AlertType::FailureDetected, "Failure", "probe down", component)
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_alert_inside_cooldown_is_suppressed() {
        let (_dir, store) = store();
        let log = Recording::new(AlertChannel::Log, false);
        let dispatcher = AlertDispatcher::with_transports(store.clone(), vec![log.clone()], HashMap::new());

        let first = dispatcher.send(failure_request("api")).await;
        assert!(!first.is_empty());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(dispatcher.send(failure_request("api")).await.is_empty());

        // Other components have their own window
        assert!(!dispatcher.send(failure_request("db")).await.is_empty());

        tokio::time::advance(Duration::from_secs(181)).await;
        assert!(!dispatcher.send(failure_request("api")).await.is_empty());

        let persisted = store.alerts_since(Utc::now() - ChronoDuration::hours(1)).unwrap();
        assert_eq!(persisted.len(), 3, "suppressed alerts are not persisted");
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let (_dir, store) = store();
        let chat = Recording::new(AlertChannel::Chat, true);
        let log = Recording::new(AlertChannel::Log, false);
        let dispatcher =
            AlertDispatcher::with_transports(store.clone(), vec![chat.clone(), log.clone()], HashMap::new());

        let deliveries = dispatcher
            .send(failure_request("api").priority(AlertPriority::Critical))
            .await;

        assert_eq!(deliveries.len(), AlertChannel::ALL.len());
        let by_channel: HashMap<_, _> = deliveries.iter().map(|d| (d.channel, d)).collect();
        assert!(by_channel[&AlertChannel::Log].success);
        assert!(!by_channel[&AlertChannel::Chat].success);
        assert_eq!(
            by_channel[&AlertChannel::Email].error.as_deref(),
            Some("Channel not enabled or configured")
        );
        assert_eq!(chat.sent.load(Ordering::SeqCst), 1);
        assert_eq!(log.sent.load(Ordering::SeqCst), 1);

        let stored = store.deliveries_for(deliveries[0].alert_id).unwrap();
        assert_eq!(stored.len(), AlertChannel::ALL.len());

        let stats = dispatcher.statistics(1).await.unwrap();
        assert_eq!(stats.total_alerts, 1);
        assert_eq!(stats.successful_deliveries, 1);
        assert_eq!(stats.channels[&AlertChannel::Chat].attempts, 1);
        assert_eq!(stats.channels[&AlertChannel::Chat].successes, 0);
    }

    #[tokio::test]
    async fn low_priority_goes_to_log_only() {
        let (_dir, store) = store();
        let chat = Recording::new(AlertChannel::Chat, false);
        let log = Recording::new(AlertChannel::Log, false);
        let dispatcher = AlertDispatcher::with_transports(store, vec![chat.clone(), log.clone()], HashMap::new());

        let deliveries = dispatcher
            .send(AlertRequest::new(AlertType::Maintenance, "Window", "planned", "db"))
            .await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].channel, AlertChannel::Log);
        assert_eq!(chat.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn escalation_alert_is_critical() {
        let (_dir, store) = store();
        let log = Recording::new(AlertChannel::Log, false);
        let dispatcher = AlertDispatcher::with_transports(store.clone(), vec![log], HashMap::new());

        let event = FailureEvent::new(FailureType::ApiTimeout, "api", Severity::High, "timeout");
        let session = RecoverySession::new(event, Utc::now());
        dispatcher.send_escalation_alert(&session, "All recovery stages exhausted").await;

        let alerts = store.alerts_since(Utc::now() - ChronoDuration::hours(1)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, AlertPriority::Critical);
        assert_eq!(alerts[0].alert_type, AlertType::Escalation);
        assert_eq!(alerts[0].channels, AlertChannel::ALL.to_vec());
    }

    #[tokio::test]
    async fn disabled_dispatcher_sends_nothing() {
        let (_dir, store) = store();
        let log = Recording::new(AlertChannel::Log, false);
        let dispatcher = AlertDispatcher::with_transports(store, vec![log.clone()], HashMap::new());
        dispatcher.set_enabled(false);
        assert!(dispatcher.send(failure_request("api")).await.is_empty());
        assert_eq!(log.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn configured_cooldown_overrides_default() {
        let (_dir, store) = store();
        let mut config = AlertsConfig::default();
        config.cooldowns.insert("failure_detected".to_string(), 5);
        let dispatcher = AlertDispatcher::new(&config, store).unwrap();
        assert_eq!(dispatcher.cooldown_for(AlertType::FailureDetected), Duration::from_secs(5));
        assert_eq!(dispatcher.cooldown_for(AlertType::Escalation), Duration::from_secs(60));
    }
}
