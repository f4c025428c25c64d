//! Failure Detector: polls registered probes and scores consecutive failures
//!
//! One loop ticks every `detector.poll_interval_secs`. On each tick every
//! enabled probe whose own interval has elapsed is checked under a hard
//! timeout. Healthy answers reset the probe's counter; unhealthy answers,
//! probe errors and timeouts increment it. The tick on which the counter
//! reaches the threshold creates one `FailureEvent`, persists it and hands
//! it to the orchestrator over a bounded queue without waiting.
//!
//! Registry locking follows a read/decide/release pattern: probes are
//! invoked and the store is written with no lock held.

mod probe;

pub use probe::*;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DetectorConfig;
use crate::storage::{StorageError, Store};
use crate::types::{ComponentState, ComponentStatus, FailureEvent, FailureType, Severity};

/// Mutable per-probe run state, owned by the polling loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeRunState {
    #[serde(skip)]
    pub last_check: Option<Instant>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_healthy: Option<bool>,
}

struct ProbeRegistration {
    name: String,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    enabled: bool,
    state: ProbeRunState,
}

/// Read-only view of one registered probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeInfo {
    pub name: String,
    pub interval_secs: u64,
    pub enabled: bool,
    pub state: ProbeRunState,
}

/// Detector statistics over a window.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStatistics {
    pub period_days: u32,
    pub total_failures: usize,
    pub resolved_failures: usize,
    pub avg_resolution_minutes: f64,
    pub by_type: BTreeMap<FailureType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub component_states: Vec<ComponentState>,
    pub active_monitors: usize,
    pub probes: Vec<ProbeInfo>,
}

/// Result of one probe check, gathered before the registry is updated.
struct CheckOutcome {
    name: String,
    healthy: bool,
    detail: serde_json::Value,
    error: Option<String>,
}

/// Raises a liveness flag for as long as a loop runs, and lowers it when the
/// loop returns or unwinds.
pub(crate) struct LivenessGuard<'a>(&'a AtomicBool);

impl<'a> LivenessGuard<'a> {
    pub(crate) fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LivenessGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FailureDetector {
    config: DetectorConfig,
    store: Store,
    probes: Mutex<Vec<ProbeRegistration>>,
    events: mpsc::Sender<FailureEvent>,
    running: AtomicBool,
}

impl FailureDetector {
    /// Build a detector and the receiving end of its event queue.
    pub fn new(config: DetectorConfig, store: Store) -> (Self, mpsc::Receiver<FailureEvent>) {
        let (tx, rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let detector = Self {
            config,
            store,
            probes: Mutex::new(Vec::new()),
            events: tx,
            running: AtomicBool::new(false),
        };
        (detector, rx)
    }

    /// Register (or replace) a probe. Run state starts fresh.
    pub async fn register(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>, interval: Duration, enabled: bool) {
        let name = name.into();
        let mut probes = self.probes.lock().await;
        probes.retain(|p| p.name != name);
        info!(probe = %name, interval_secs = interval.as_secs(), enabled, "Probe registered");
        probes.push(ProbeRegistration {
            name,
            probe,
            interval,
            enabled,
            state: ProbeRunState::default(),
        });
    }

    /// Enable or disable a probe. Returns false when no such probe exists.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut probes = self.probes.lock().await;
        match probes.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn probes(&self) -> Vec<ProbeInfo> {
        self.probes
            .lock()
            .await
            .iter()
            .map(|p| ProbeInfo {
                name: p.name.clone(),
                interval_secs: p.interval.as_secs(),
                enabled: p.enabled,
                state: p.state.clone(),
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Polling loop. Returns when `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let _live = LivenessGuard::raise(&self.running);
        let tick = Duration::from_secs(self.config.poll_interval_secs);
        info!(
            tick_secs = tick.as_secs(),
            threshold = self.config.failure_threshold,
            "[FailureDetector] Task starting"
        );

        loop {
            let pause = match self.poll_once().await {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!(events = events.len(), "[FailureDetector] Tick produced failure events");
                    }
                    tick
                }
                Err(e) => {
                    error!(error = %e, backoff_secs = self.config.error_backoff_secs, "[FailureDetector] Tick failed");
                    Duration::from_secs(self.config.error_backoff_secs)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("[FailureDetector] Received shutdown signal");
    }

    /// Check every due probe once and return the failure events created.
    pub async fn poll_once(&self) -> Result<Vec<FailureEvent>, StorageError> {
        let due: Vec<(String, Arc<dyn HealthProbe>)> = {
            let now = Instant::now();
            let mut probes = self.probes.lock().await;
            probes
                .iter_mut()
                .filter(|p| p.enabled)
                .filter(|p| p.state.last_check.map_or(true, |last| now.duration_since(last) >= p.interval))
                .map(|p| {
                    p.state.last_check = Some(now);
                    (p.name.clone(), Arc::clone(&p.probe))
                })
                .collect()
        };

        if due.is_empty() {
            return Ok(Vec::new());
        }

        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let checks = due.into_iter().map(|(name, probe)| async move {
            match tokio::time::timeout(timeout, probe.check()).await {
                Ok(Ok(outcome)) => CheckOutcome {
                    healthy: outcome.is_healthy(),
                    detail: outcome.to_json(),
                    error: None,
                    name,
                },
                Ok(Err(e)) => CheckOutcome {
                    healthy: false,
                    detail: serde_json::Value::Null,
                    error: Some(e.to_string()),
                    name,
                },
                Err(_) => CheckOutcome {
                    healthy: false,
                    detail: serde_json::Value::Null,
                    error: Some(ProbeError::Timeout(timeout).to_string()),
                    name,
                },
            }
        });
        let outcomes = futures::future::join_all(checks).await;

        let mut events = Vec::new();
        let mut first_error = None;
        for outcome in outcomes {
            let name = outcome.name.clone();
            match self.apply_outcome(outcome).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    warn!(probe = %name, error = %e, "Failed to record probe outcome");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    /// Fold one check result into the probe's counter and persisted state.
    ///
    /// The counter only moves past the threshold once the failure event is
    /// stored, so a storage error on the crossing tick leaves the crossing
    /// to the next tick.
    async fn apply_outcome(&self, outcome: CheckOutcome) -> Result<Option<FailureEvent>, StorageError> {
        let now = Utc::now();
        let threshold = self.config.failure_threshold;

        let previous = {
            let mut probes = self.probes.lock().await;
            let Some(reg) = probes.iter_mut().find(|p| p.name == outcome.name) else {
                return Ok(None);
            };
            reg.state.last_check_at = Some(now);
            reg.state.last_healthy = Some(outcome.healthy);
            reg.state.consecutive_failures
        };
        let consecutive = if outcome.healthy { 0 } else { previous + 1 };
        let crossed = previous < threshold && consecutive >= threshold;

        let result = self.record_outcome(&outcome, now, previous, consecutive, crossed);

        if result.is_ok() || !crossed {
            let mut probes = self.probes.lock().await;
            if let Some(reg) = probes.iter_mut().find(|p| p.name == outcome.name) {
                reg.state.consecutive_failures = consecutive;
            }
        }

        let event = result?;
        if let Some(event) = &event {
            if let Err(e) = self.events.try_send(event.clone()) {
                warn!(component = %event.component, error = %e, "Failure event queue full, handoff dropped");
            }
        }
        Ok(event)
    }

    /// Persist the component state and, on a crossing, the new failure event.
    fn record_outcome(
        &self,
        outcome: &CheckOutcome,
        now: DateTime<Utc>,
        previous: u32,
        consecutive: u32,
        crossed: bool,
    ) -> Result<Option<FailureEvent>, StorageError> {
        let mut state = self
            .store
            .component_state(&outcome.name)?
            .unwrap_or_else(|| ComponentState::new(&outcome.name));
        state.last_check = Some(now);
        state.consecutive_failures = consecutive;

        if outcome.healthy {
            if previous > 0 {
                info!(probe = %outcome.name, after_failures = previous, "Probe recovered");
            }
            if state.status != ComponentStatus::Healthy {
                state.status = ComponentStatus::Healthy;
                state.uptime_start = Some(now);
            }
            self.store.save_component_state(&state)?;
            return Ok(None);
        }

        match &outcome.error {
            Some(err) => warn!(probe = %outcome.name, consecutive, error = %err, "Probe check errored"),
            None => warn!(probe = %outcome.name, consecutive, "Probe reported unhealthy"),
        }

        if !crossed {
            self.store.save_component_state(&state)?;
            return Ok(None);
        }

        let failure_type = if outcome.error.is_some() {
            FailureType::ServerUnresponsive
        } else {
            FailureType::for_probe(&outcome.name)
        };
        let severity = Severity::from_consecutive_failures(consecutive);
        let message = match &outcome.error {
            Some(err) => format!("Probe failed {} times consecutively: {}", consecutive, err),
            None => format!("Probe failed {} times consecutively", consecutive),
        };
        let mut event = FailureEvent::new(failure_type, &outcome.name, severity, message)
            .with_context("consecutive_failures", consecutive)
            .with_context("result", outcome.detail.clone());
        event.timestamp = now;

        self.store.save_failure_event(&event)?;
        state.status = ComponentStatus::Unhealthy;
        state.total_failures += 1;
        state.last_failure_time = Some(now);
        if let Err(e) = self.store.save_component_state(&state) {
            warn!(component = %event.component, error = %e, "Failed to save component state after failure event");
        }

        info!(
            component = %event.component,
            failure_type = %event.failure_type,
            severity = %event.severity,
            consecutive,
            "Failure threshold crossed"
        );
        Ok(Some(event))
    }

    /// Failure breakdown over the last `days` plus current component states.
    pub async fn statistics(&self, days: u32) -> Result<DetectorStatistics, StorageError> {
        let since = Utc::now() - ChronoDuration::days(i64::from(days));
        let events = self.store.failure_events_since(since)?;

        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for e in &events {
            *by_type.entry(e.failure_type).or_insert(0) += 1;
            *by_severity.entry(e.severity).or_insert(0) += 1;
        }
        let resolution: Vec<f64> = events.iter().filter_map(FailureEvent::resolution_minutes).collect();
        let avg_resolution_minutes = if resolution.is_empty() {
            0.0
        } else {
            resolution.iter().sum::<f64>() / resolution.len() as f64
        };

        let probes = self.probes().await;
        Ok(DetectorStatistics {
            period_days: days,
            total_failures: events.len(),
            resolved_failures: events.iter().filter(|e| e.resolved).count(),
            avg_resolution_minutes,
            by_type,
            by_severity,
            component_states: self.store.component_states()?,
            active_monitors: probes.iter().filter(|p| p.enabled).count(),
            probes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Probe replaying a fixed script of answers, then repeating the last.
    struct Scripted {
        answers: Vec<Result<bool, ()>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answers: Vec<Result<bool, ()>>) -> Arc<Self> {
            Arc::new(Self {
                answers,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for Scripted {
        async fn check(&self) -> Result<ProbeOutcome, ProbeError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst).min(self.answers.len() - 1);
            match self.answers[i] {
                Ok(ok) => Ok(ProbeOutcome::Flag(ok)),
                Err(()) => Err(ProbeError::Other("connection reset".into())),
            }
        }
    }

    fn detector() -> (tempfile::TempDir, FailureDetector, mpsc::Receiver<FailureEvent>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        let (detector, rx) = FailureDetector::new(DetectorConfig::default(), store);
        (dir, detector, rx)
    }

    #[tokio::test]
    async fn threshold_crossing_emits_exactly_once() {
        let (_dir, detector, mut rx) = detector();
        detector
            .register("database", Scripted::new(vec![Ok(false)]), Duration::ZERO, true)
            .await;

        let mut emitted = Vec::new();
        for _ in 0..8 {
            emitted.extend(detector.poll_once().await.unwrap());
        }

        assert_eq!(emitted.len(), 1);
        let event = &emitted[0];
        assert_eq!(event.failure_type, FailureType::DatabaseConnection);
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(rx.try_recv().unwrap().id, event.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn healthy_poll_resets_counter_and_state() {
        let (_dir, detector, _rx) = detector();
        detector
            .register(
                "database",
                Scripted::new(vec![Ok(false), Ok(false), Ok(false), Ok(true)]),
                Duration::ZERO,
                true,
            )
            .await;

        for _ in 0..3 {
            detector.poll_once().await.unwrap();
        }
        let state = detector.store.component_state("database").unwrap().unwrap();
        assert_eq!(state.status, ComponentStatus::Unhealthy);
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.total_failures, 1);

        detector.poll_once().await.unwrap();
        let state = detector.store.component_state("database").unwrap().unwrap();
        assert_eq!(state.status, ComponentStatus::Healthy);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(detector.probes().await[0].state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn probe_errors_count_as_failures() {
        let (_dir, detector, _rx) = detector();
        detector
            .register("local_api", Scripted::new(vec![Err(())]), Duration::ZERO, true)
            .await;

        let mut emitted = Vec::new();
        for _ in 0..3 {
            emitted.extend(detector.poll_once().await.unwrap());
        }
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].failure_type, FailureType::ServerUnresponsive);
        assert!(emitted[0].message.contains("connection reset"));
    }

    #[tokio::test]
    async fn re_arms_after_recovery() {
        let (_dir, detector, _rx) = detector();
        let script = vec![Ok(false), Ok(false), Ok(false), Ok(true), Ok(false), Ok(false), Ok(false)];
        detector.register("gpu_server", Scripted::new(script), Duration::ZERO, true).await;

        let mut emitted = Vec::new();
        for _ in 0..7 {
            emitted.extend(detector.poll_once().await.unwrap());
        }
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|e| e.failure_type == FailureType::AcceleratorError));
    }

    #[tokio::test]
    async fn disabled_probes_are_not_polled() {
        let (_dir, detector, _rx) = detector();
        let probe = Scripted::new(vec![Ok(false)]);
        detector.register("database", probe.clone(), Duration::ZERO, false).await;
        detector.poll_once().await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        assert!(detector.set_enabled("database", true).await);
        detector.poll_once().await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_respect_their_own_interval() {
        let (_dir, detector, _rx) = detector();
        let probe = Scripted::new(vec![Ok(true)]);
        detector.register("database", probe.clone(), Duration::from_secs(30), true).await;

        detector.poll_once().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        detector.poll_once().await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        detector.poll_once().await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn statistics_break_down_failures() {
        let (_dir, detector, _rx) = detector();
        detector
            .register("database", Scripted::new(vec![Ok(false)]), Duration::ZERO, true)
            .await;
        for _ in 0..3 {
            detector.poll_once().await.unwrap();
        }

        let stats = detector.statistics(7).await.unwrap();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.by_type.get(&FailureType::DatabaseConnection), Some(&1));
        assert_eq!(stats.by_severity.get(&Severity::Medium), Some(&1));
        assert_eq!(stats.active_monitors, 1);
        assert_eq!(stats.component_states.len(), 1);
    }

    #[tokio::test]
    async fn storage_error_on_crossing_defers_the_event() {
        let (_dir, detector, mut rx) = detector();
        detector
            .register("database", Scripted::new(vec![Ok(false)]), Duration::ZERO, true)
            .await;
        detector
            .register("zzz", Scripted::new(vec![Ok(false)]), Duration::ZERO, true)
            .await;

        for _ in 0..2 {
            assert!(detector.poll_once().await.unwrap().is_empty());
        }

        let tree = detector.store.component_states_tree();
        tree.insert("database", b"{not json".to_vec()).unwrap();
        let err = detector.poll_once().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
        tree.remove("database").unwrap();

        for _ in 0..10 {
            detector.poll_once().await.unwrap();
        }

        let mut components = Vec::new();
        while let Ok(event) = rx.try_recv() {
            components.push(event.component);
        }
        components.sort();
        assert_eq!(components, vec!["database".to_string(), "zzz".to_string()]);

        let persisted = detector.store.failure_events_since(Utc::now() - ChronoDuration::minutes(1)).unwrap();
        assert_eq!(persisted.len(), 2);

        let probes = detector.probes().await;
        let count = |name: &str| {
            probes
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.state.consecutive_failures)
                .unwrap()
        };
        assert_eq!(count("database"), 12);
        assert_eq!(count("zzz"), 13);
    }

    struct Panicking;

    #[async_trait]
    impl HealthProbe for Panicking {
        async fn check(&self) -> Result<ProbeOutcome, ProbeError> {
            panic!("probe blew up");
        }
    }

    #[tokio::test]
    async fn liveness_flag_drops_when_loop_panics() {
        let (_dir, detector, _rx) = detector();
        detector.register("database", Arc::new(Panicking), Duration::ZERO, true).await;
        let detector = Arc::new(detector);

        let handle = tokio::spawn(Arc::clone(&detector).run(CancellationToken::new()));
        assert!(handle.await.unwrap_err().is_panic());
        assert!(!detector.is_running());
    }
}
