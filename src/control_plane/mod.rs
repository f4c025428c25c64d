//! Control Plane: composition root and operator surface
//!
//! Owns one instance of every component, all sharing a single [`Store`]:
//!
//! ```text
//!   FailureDetector ──mpsc──▶ RecoverySessionOrchestrator ──▶ AutoRecoveryEngine
//!         │                            │
//!         └──────────┬─────────────────┘
//!                    ▼
//!             AlertDispatcher ◀── Watchdog / AnalyticsScheduler
//! ```
//!
//! `start()` spawns four supervised loops into a `JoinSet` sharing one
//! `CancellationToken`; `stop()` cancels them, drains the set and sends a
//! shutdown status alert. The orchestrator loop hands the event queue back
//! when it exits, so a stopped plane can be started again.
//!
//! Runtime settings live in an `ArcSwap`; loops re-read them every cycle.

mod report;
mod settings;
mod tasks;

pub use report::*;
pub use settings::{apply_updates, ConfigUpdate, IgnoredKey};
pub use tasks::{watchdog_findings, TaskName};

use anyhow::Context;
use arc_swap::ArcSwap;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerts::{AlertDispatcher, NotificationTransport};
use crate::analytics::FailureAnalyticsEngine;
use crate::config::defaults::{
    HIGH_RISK_PROBABILITY, PATTERN_ALERT_CONFIDENCE, SCHEDULED_PATTERN_DAYS, SCHEDULED_PREDICTION_DAYS,
    SCHEDULED_TREND_DAYS, SHUTDOWN_GRACE_SECS, STATUS_WINDOW_DAYS, TREND_ALERT_PERCENT,
};
use crate::config::{AutohealConfig, ControlSettings, ProbeKind};
use crate::detector::{FailureDetector, HealthProbe, HttpProbe, TcpProbe};
use crate::orchestrator::RecoverySessionOrchestrator;
use crate::recovery::{AutoRecoveryEngine, HttpActionExecutor, RecoveryActionExecutor};
use crate::storage::{StorageError, Store};
use crate::types::{
    AlertRequest, AlertType, FailureEvent, FailureType, RecoveryAction, RecoverySession, Severity, TrendDirection,
};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unknown failure type '{0}'")]
    UnknownFailureType(String),
    #[error("control plane is already running")]
    AlreadyRunning,
    #[error("failure event queue unavailable; the previous orchestrator loop did not exit cleanly")]
    QueueUnavailable,
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Summary of one scheduled analytics pass.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsPass {
    pub trend: TrendDirection,
    pub trend_percentage: f64,
    pub patterns: usize,
    pub high_confidence_patterns: usize,
    pub predictions: usize,
    pub high_risk_components: Vec<String>,
    pub alerts_sent: usize,
}

struct Runtime {
    cancel: CancellationToken,
    task_set: JoinSet<TaskName>,
    started_at: chrono::DateTime<Utc>,
}

pub struct ControlPlane {
    config: AutohealConfig,
    settings: ArcSwap<ControlSettings>,
    store: Store,
    detector: Arc<FailureDetector>,
    engine: Arc<AutoRecoveryEngine>,
    orchestrator: Arc<RecoverySessionOrchestrator>,
    alerts: Arc<AlertDispatcher>,
    analytics: Arc<FailureAnalyticsEngine>,
    events: Mutex<Option<mpsc::Receiver<FailureEvent>>>,
    runtime: Mutex<Option<Runtime>>,
}

impl ControlPlane {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Open the store under `config.storage.data_dir` and build every component.
    ///
    /// Failing to open the store is fatal.
    pub async fn open(config: AutohealConfig) -> anyhow::Result<Self> {
        let data_dir = config.storage.data_dir.clone();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let store = Store::open(&data_dir).with_context(|| format!("Failed to open store at {}", data_dir.display()))?;
        Self::with_store(config, store).await
    }

    /// Build on an already-open store. Registers the probes and actions the
    /// config declares and reloads sessions left active by a previous run.
    pub async fn with_store(config: AutohealConfig, store: Store) -> anyhow::Result<Self> {
        let (detector, events) = FailureDetector::new(config.detector.clone(), store.clone());
        let engine = Arc::new(AutoRecoveryEngine::new(&config.recovery, store.clone()));
        let alerts = Arc::new(
            AlertDispatcher::new(&config.alerts, store.clone()).context("Failed to build alert transports")?,
        );
        let orchestrator = Arc::new(RecoverySessionOrchestrator::new(
            config.orchestrator.clone(),
            store.clone(),
            Arc::clone(&engine),
            Arc::clone(&alerts),
        ));
        let analytics = Arc::new(FailureAnalyticsEngine::new(config.analytics.clone(), store.clone()));

        alerts.set_enabled(config.control.enable_alerts);
        orchestrator.set_auto_recovery(config.control.enable_auto_recovery);

        let plane = Self {
            settings: ArcSwap::from_pointee(config.control.clone()),
            config,
            store,
            detector: Arc::new(detector),
            engine,
            orchestrator,
            alerts,
            analytics,
            events: Mutex::new(Some(events)),
            runtime: Mutex::new(None),
        };

        plane
            .register_declared()
            .await
            .context("Failed to register declared probes and actions")?;
        let restored = plane
            .orchestrator
            .restore_active_sessions()
            .await
            .context("Failed to restore recovery sessions")?;

        info!(
            data_dir = %plane.config.storage.data_dir.display(),
            probes = plane.config.probes.len(),
            actions = plane.config.actions.len(),
            restored,
            "Control plane ready"
        );
        Ok(plane)
    }

    async fn register_declared(&self) -> anyhow::Result<()> {
        let probe_timeout = Duration::from_secs(self.config.detector.probe_timeout_secs);
        for spec in &self.config.probes {
            let probe: Arc<dyn HealthProbe> = match &spec.kind {
                ProbeKind::Http { url, expected_status } => Arc::new(
                    HttpProbe::new(url.clone(), *expected_status, probe_timeout)
                        .with_context(|| format!("probe '{}'", spec.name))?,
                ),
                ProbeKind::Tcp { address } => Arc::new(TcpProbe::new(address.clone())),
            };
            self.detector
                .register(spec.name.clone(), probe, Duration::from_secs(spec.interval_secs), spec.enabled)
                .await;
        }

        let action_timeout = Duration::from_secs(self.config.recovery.action_timeout_secs);
        for spec in &self.config.actions {
            let executor = HttpActionExecutor::new(spec.action, spec.url.clone(), spec.headers.clone(), action_timeout)
                .with_context(|| format!("action '{}'", spec.action))?;
            self.engine.register_executor(spec.action, Arc::new(executor)).await;
        }
        Ok(())
    }

    // ========================================================================
    // Accessors and registration
    // ========================================================================

    pub fn config(&self) -> &AutohealConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.detector
    }

    pub fn engine(&self) -> &Arc<AutoRecoveryEngine> {
        &self.engine
    }

    pub fn orchestrator(&self) -> &Arc<RecoverySessionOrchestrator> {
        &self.orchestrator
    }

    pub fn alerts(&self) -> &Arc<AlertDispatcher> {
        &self.alerts
    }

    pub fn analytics(&self) -> &Arc<FailureAnalyticsEngine> {
        &self.analytics
    }

    /// Current runtime settings.
    pub fn settings(&self) -> Arc<ControlSettings> {
        self.settings.load_full()
    }

    pub async fn register_probe(
        &self,
        name: impl Into<String>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        enabled: bool,
    ) {
        self.detector.register(name, probe, interval, enabled).await;
    }

    pub async fn register_executor(&self, action: RecoveryAction, executor: Arc<dyn RecoveryActionExecutor>) {
        self.engine.register_executor(action, executor).await;
    }

    pub async fn register_transport(&self, transport: Arc<dyn NotificationTransport>) {
        self.alerts.register_transport(transport).await;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn start(self: &Arc<Self>) -> Result<(), ControlError> {
        let started_at = {
            let mut runtime = self.runtime.lock().await;
            if runtime.is_some() {
                return Err(ControlError::AlreadyRunning);
            }
            let events = self.events.lock().await.take().ok_or(ControlError::QueueUnavailable)?;

            info!("🔒 Supervisor: Initializing task monitoring");
            let cancel = CancellationToken::new();
            let mut task_set = JoinSet::new();

            let detector = Arc::clone(&self.detector);
            let token = cancel.clone();
            task_set.spawn(async move {
                detector.run(token).await;
                TaskName::FailureDetector
            });

            let plane = Arc::clone(self);
            let token = cancel.clone();
            task_set.spawn(async move {
                let events = Arc::clone(&plane.orchestrator).run(events, token).await;
                *plane.events.lock().await = Some(events);
                TaskName::Orchestrator
            });

            task_set.spawn(tasks::run_watchdog(Arc::clone(self), cancel.clone()));
            task_set.spawn(tasks::run_analytics_scheduler(Arc::clone(self), cancel.clone()));

            let started_at = Utc::now();
            *runtime = Some(Runtime {
                cancel,
                task_set,
                started_at,
            });
            started_at
        };

        let settings = self.settings();
        info!(
            auto_recovery = settings.enable_auto_recovery,
            alerts = settings.enable_alerts,
            analytics = settings.enable_analytics,
            "Control plane started"
        );
        let context = HashMap::from([("start_time".to_string(), json!(started_at.to_rfc3339()))]);
        self.alerts
            .send_system_status(
                "control_plane.startup",
                "Self-healing control plane started",
                "Failure detection and automated recovery are active",
                context,
            )
            .await;
        Ok(())
    }

    /// Cancel and drain the loops, then send a shutdown alert with final statistics.
    pub async fn stop(&self) {
        let Some(mut runtime) = self.runtime.lock().await.take() else {
            info!("Control plane is not running");
            return;
        };

        info!("🛑 Supervisor: Shutdown signal received");
        runtime.cancel.cancel();
        let drain = async {
            while let Some(result) = runtime.task_set.join_next().await {
                match result {
                    Ok(task) => info!("🔒 Supervisor: Task {} completed normally", task),
                    Err(e) => error!("🔒 Supervisor: Task panicked: {}", e),
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), drain)
            .await
            .is_err()
        {
            warn!(grace_secs = SHUTDOWN_GRACE_SECS, "🔒 Supervisor: Tasks did not stop in time, aborting");
            runtime.task_set.abort_all();
        }

        let uptime_hours = (Utc::now() - runtime.started_at).num_seconds() as f64 / 3600.0;
        let final_stats = match self.statistics().await {
            Ok(stats) => serde_json::to_value(stats).unwrap_or(Value::Null),
            Err(e) => {
                error!(error = %e, "Failed to collect final statistics");
                Value::Null
            }
        };
        let context = HashMap::from([
            ("stop_time".to_string(), json!(Utc::now().to_rfc3339())),
            ("uptime_hours".to_string(), json!(uptime_hours)),
            ("final_stats".to_string(), final_stats),
        ]);
        self.alerts
            .send_system_status(
                "control_plane.shutdown",
                "Self-healing control plane stopped",
                format!("Control plane stopped after {:.1} hours", uptime_hours),
                context,
            )
            .await;

        if let Err(e) = self.store.flush() {
            error!(error = %e, "Failed to flush store on shutdown");
        }
        info!(uptime_hours, "Control plane stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    async fn started_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.runtime.lock().await.as_ref().map(|r| r.started_at)
    }

    // ========================================================================
    // Operator controls
    // ========================================================================

    /// Apply recognized `[control]` keys; unknown or ill-typed ones are ignored.
    pub fn update_configuration(&self, updates: &Map<String, Value>) -> ConfigUpdate {
        let current = self.settings.load_full();
        let (next, report) = apply_updates(&current, updates);

        for key in &report.applied {
            info!(key = %key, value = %updates[key], "Configuration updated");
        }
        for ignored in &report.ignored {
            warn!(key = %ignored.key, reason = %ignored.reason, "Configuration key ignored");
        }

        if next != *current {
            self.alerts.set_enabled(next.enable_alerts);
            self.orchestrator.set_auto_recovery(next.enable_auto_recovery);
            self.settings.store(Arc::new(next));
        }
        report
    }

    /// Open (or join) a session for an operator-reported failure.
    ///
    /// Runs even with auto recovery disabled; the operator asked for it.
    pub async fn trigger_manual_recovery(&self, component: &str, failure_type: &str) -> Result<String, ControlError> {
        let failure_type: FailureType = failure_type
            .parse()
            .map_err(|_| ControlError::UnknownFailureType(failure_type.to_string()))?;

        let event = FailureEvent::new(
            failure_type,
            component,
            Severity::Medium,
            format!("Manual recovery triggered for {}", component),
        )
        .with_context("manual_trigger", true)
        .with_context("triggered_by", "operator");
        self.store.save_failure_event(&event)?;

        let session_id = self.orchestrator.handle_failure(event).await?;
        info!(component, failure_type = %failure_type, session_id = %session_id, "Manual recovery triggered");
        Ok(session_id)
    }

    pub async fn cancel_session(&self, session_id: &str, reason: &str) -> Result<bool, ControlError> {
        Ok(self.orchestrator.cancel_session(session_id, reason).await?)
    }

    pub async fn get_active_sessions(&self) -> Vec<RecoverySession> {
        self.orchestrator.get_active_sessions().await
    }

    pub async fn get_session_details(&self, session_id: &str) -> Result<Option<RecoverySession>, ControlError> {
        Ok(self.orchestrator.get_session_details(session_id).await?)
    }

    // ========================================================================
    // Status and reporting
    // ========================================================================

    /// Headline statistics over the status window.
    pub async fn statistics(&self) -> Result<SystemStatistics, ControlError> {
        let days = STATUS_WINDOW_DAYS;
        let detector = self.detector.statistics(days).await?;
        let recovery = self.engine.statistics(days)?;
        let orchestrator = self.orchestrator.statistics(days).await?;
        let alerts = self.alerts.statistics(days).await?;
        let uptime_hours = self
            .started_at()
            .await
            .map_or(0.0, |t| (Utc::now() - t).num_seconds() as f64 / 3600.0);

        Ok(SystemStatistics {
            period_days: days,
            uptime_hours,
            total_failures_detected: detector.total_failures,
            failures_per_day: detector.total_failures as f64 / f64::from(days),
            total_recoveries_attempted: recovery.total_attempts,
            successful_recoveries: recovery.successful_attempts,
            recovery_success_rate: recovery.success_rate,
            escalated_failures: orchestrator.escalations_total,
            alerts_sent: alerts.total_alerts,
        })
    }

    pub async fn get_system_status(&self) -> Result<SystemStatus, ControlError> {
        let started_at = self.started_at().await;
        let probes = self.detector.probes().await;
        let statistics = self.statistics().await?;

        Ok(SystemStatus {
            running: started_at.is_some(),
            started_at,
            uptime_hours: statistics.uptime_hours,
            settings: (*self.settings()).clone(),
            detector: DetectorStatus {
                running: self.detector.is_running(),
                enabled_probes: probes.iter().filter(|p| p.enabled).count(),
                probes,
            },
            orchestrator: OrchestratorStatus {
                running: self.orchestrator.is_running(),
                auto_recovery: self.orchestrator.auto_recovery_enabled(),
                active_sessions: self.orchestrator.get_active_sessions().await.len(),
                counters: self.orchestrator.counters().await,
            },
            registered_actions: self.engine.registered_actions().await,
            alerts: AlertsStatus {
                enabled: self.alerts.is_enabled(),
                enabled_channels: self.alerts.enabled_channels().await,
            },
            statistics,
        })
    }

    pub async fn get_comprehensive_report(&self, days: u32) -> Result<ComprehensiveReport, ControlError> {
        let status = self.get_system_status().await?;
        let engine = Arc::clone(&self.analytics);
        let failure_analysis = tokio::task::spawn_blocking(move || engine.report(days)).await??;
        let detector = self.detector.statistics(days).await?;
        let recovery = self.engine.statistics(days)?;
        let orchestrator = self.orchestrator.statistics(days).await?;
        let alerts = self.alerts.statistics(days).await?;

        let since = Utc::now() - ChronoDuration::days(i64::from(days));
        let sessions: Vec<_> = self
            .store
            .sessions()?
            .into_iter()
            .filter(|s| s.start_time >= since)
            .collect();

        let availability = availability_percent(days, detector.total_failures);
        let key_metrics = KeyMetrics {
            availability_percent: availability,
            mttr_minutes: mttr_minutes(&sessions),
            mtbf_hours: mtbf_hours(days, detector.total_failures),
            recovery_success_rate: recovery.success_rate,
            alert_delivery_rate: if alerts.total_deliveries == 0 {
                1.0
            } else {
                alerts.delivery_rate
            },
        };
        let recommendations = recommendations(
            &recovery,
            orchestrator.escalations_total,
            availability,
            &failure_analysis.recommendations,
        );

        Ok(ComprehensiveReport {
            generated_at: Utc::now(),
            period_days: days,
            status,
            failure_analysis,
            detector,
            recovery,
            orchestrator,
            alerts,
            key_metrics,
            recommendations,
        })
    }

    // ========================================================================
    // Periodic work (driven by the supervised loops)
    // ========================================================================

    /// Watchdog check. Sends one status alert when anything is wrong.
    pub async fn health_check(&self) -> Vec<String> {
        let active = self.orchestrator.get_active_sessions().await;
        let findings = watchdog_findings(
            self.detector.is_running(),
            self.orchestrator.is_running(),
            &active,
            Utc::now(),
        );
        for finding in &findings {
            warn!(finding = %finding, "Health check finding");
        }
        if !findings.is_empty() {
            let context = HashMap::from([("health_issues".to_string(), json!(findings))]);
            self.alerts
                .send_system_status(
                    "control_plane.watchdog",
                    "System health issues detected",
                    format!("Health check found {} issue(s)", findings.len()),
                    context,
                )
                .await;
        }
        findings
    }

    /// Trend, patterns and predictions, alerting on notable findings.
    pub async fn run_analytics_pass(&self) -> Result<AnalyticsPass, ControlError> {
        let engine = Arc::clone(&self.analytics);
        let (trend, patterns, predictions) = tokio::task::spawn_blocking(move || {
            Ok::<_, StorageError>((
                engine.analyze_trends(SCHEDULED_TREND_DAYS)?,
                engine.detect_patterns(SCHEDULED_PATTERN_DAYS)?,
                engine.predict(SCHEDULED_PREDICTION_DAYS)?,
            ))
        })
        .await??;

        let mut alerts_sent = 0;

        if trend.direction == TrendDirection::Increasing && trend.trend_percentage > TREND_ALERT_PERCENT {
            let request = AlertRequest::new(
                AlertType::SystemStatus,
                "Increasing failure trend detected",
                format!(
                    "Failures are rising {:.1}% over the last {} days",
                    trend.trend_percentage, trend.period_days
                ),
                "analytics.trend",
            )
            .context("trend_percentage", trend.trend_percentage)
            .context("total_failures", trend.total_failures)
            .context("daily_counts", json!(trend.daily_counts));
            if !self.alerts.send(request).await.is_empty() {
                alerts_sent += 1;
            }
        }

        let confident: Vec<_> = patterns
            .iter()
            .filter(|p| p.confidence > PATTERN_ALERT_CONFIDENCE)
            .collect();
        if !confident.is_empty() {
            let ids: Vec<_> = confident.iter().map(|p| p.pattern_id.clone()).collect();
            let request = AlertRequest::new(
                AlertType::SystemStatus,
                "New failure patterns detected",
                format!("{} high-confidence failure patterns detected", confident.len()),
                "analytics.patterns",
            )
            .context("pattern_count", confident.len())
            .context("patterns", json!(ids));
            if !self.alerts.send(request).await.is_empty() {
                alerts_sent += 1;
            }
        }

        let high_risk_components: Vec<String> = predictions
            .iter()
            .filter(|p| p.probability > HIGH_RISK_PROBABILITY)
            .map(|p| p.component.clone())
            .collect();
        if !high_risk_components.is_empty() {
            let request = AlertRequest::new(
                AlertType::SystemStatus,
                "High risk failure predictions",
                format!("High failure risk: {}", high_risk_components.join(", ")),
                "analytics.predictions",
            )
            .context("high_risk_components", json!(high_risk_components));
            if !self.alerts.send(request).await.is_empty() {
                alerts_sent += 1;
            }
        }

        Ok(AnalyticsPass {
            trend: trend.direction,
            trend_percentage: trend.trend_percentage,
            patterns: patterns.len(),
            high_confidence_patterns: confident.len(),
            predictions: predictions.len(),
            high_risk_components,
            alerts_sent,
        })
    }

    /// Periodic status report alert over the status window.
    pub async fn send_status_report(&self) -> Result<(), ControlError> {
        let report = self.analytics.report(STATUS_WINDOW_DAYS)?;
        let stats = self.statistics().await?;

        let context = HashMap::from([
            ("uptime_hours".to_string(), json!(stats.uptime_hours)),
            (
                "failure_summary".to_string(),
                json!({
                    "total_failures": report.trend.total_failures,
                    "direction": report.trend.direction,
                    "high_risk_components": report.high_risk_components,
                }),
            ),
            ("system_stats".to_string(), serde_json::to_value(&stats).unwrap_or(Value::Null)),
        ]);
        self.alerts
            .send_system_status(
                "control_plane.report",
                "System status report",
                format!(
                    "{} failures, {} recoveries attempted, {} escalations over the last {} days",
                    stats.total_failures_detected,
                    stats.total_recoveries_attempted,
                    stats.escalated_failures,
                    stats.period_days
                ),
                context,
            )
            .await;
        info!("Status report sent");
        Ok(())
    }
}
