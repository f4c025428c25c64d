//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs use these for their serde defaults,
//! so a missing key in `autoheal.toml` always falls back to the value here.

// ============================================================================
// Failure Detector
// ============================================================================

/// Detector loop tick (seconds). Each probe still runs on its own interval.
pub const DETECTOR_POLL_INTERVAL_SECS: u64 = 10;

/// Consecutive unhealthy polls before a failure event is created.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Hard timeout on a single probe invocation (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 30;

/// Default polling interval for a probe registered without one (seconds).
pub const PROBE_INTERVAL_SECS: u64 = 30;

/// Back-off after a loop-level error before the next tick (seconds).
pub const LOOP_ERROR_BACKOFF_SECS: u64 = 30;

/// Capacity of the detector → orchestrator event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 100;

// ============================================================================
// Recovery Engine
// ============================================================================

/// Minimum time between two executions of the same action on the same component (seconds).
pub const ACTION_COOLDOWN_SECS: u64 = 60;

/// Executions of one action allowed per component in a rolling hour.
pub const MAX_ACTION_EXECUTIONS_PER_HOUR: u32 = 3;

/// Hard timeout on a single action execution (seconds).
pub const ACTION_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Orchestrator
// ============================================================================

/// Orchestrator scan tick (seconds).
pub const ORCHESTRATOR_POLL_INTERVAL_SECS: u64 = 10;

// ============================================================================
// Alerts
// ============================================================================

/// Outbound HTTP timeout for chat, email relay and webhook transports (seconds).
pub const ALERT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Context fields rendered into a chat attachment.
pub const CHAT_MAX_FIELDS: usize = 10;

// ============================================================================
// Analytics
// ============================================================================

/// Minimum occurrences for a pattern to be reported.
pub const MIN_PATTERN_FREQUENCY: usize = 3;

/// Maximum gap between consecutive events of one cascade (seconds).
pub const CASCADE_WINDOW_SECS: i64 = 300;

/// Minimum cascade length.
pub const CASCADE_MIN_LENGTH: usize = 3;

/// Share of all events one hour-of-day must hold to be a peak.
pub const PEAK_HOUR_SHARE: f64 = 0.30;

/// |trend percentage| below which a trend is stable.
pub const STABLE_TREND_PERCENT: f64 = 10.0;

/// History read for predictions (days).
pub const PREDICTION_HISTORY_DAYS: i64 = 90;

/// Evidence window for the monthly rate (days).
pub const PREDICTION_RECENT_DAYS: i64 = 30;

/// Minimum recent failures before a component is predicted.
pub const PREDICTION_MIN_RECENT_FAILURES: usize = 3;

/// Predictions at or below this probability are dropped.
pub const PREDICTION_MIN_PROBABILITY: f64 = 0.3;

/// Cap on prediction confidence.
pub const PREDICTION_MAX_CONFIDENCE: f64 = 0.8;

/// Probability above which a prediction counts as high risk.
pub const HIGH_RISK_PROBABILITY: f64 = 0.7;

/// Window around an incident searched for co-failing components (seconds).
pub const ROOT_CAUSE_CORRELATION_WINDOW_SECS: i64 = 600;

// ============================================================================
// Control Plane
// ============================================================================

/// Self-health watchdog interval (seconds).
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Analytics scheduler interval (seconds).
pub const ANALYTICS_INTERVAL_SECS: u64 = 3_600;

/// Status report interval (seconds). 86 400 = daily.
pub const STATUS_REPORT_INTERVAL_SECS: u64 = 86_400;

/// Active sessions above this count trigger a watchdog alert.
pub const MAX_HEALTHY_ACTIVE_SESSIONS: usize = 10;

/// Sessions older than this trigger a watchdog alert (seconds).
pub const STALE_SESSION_SECS: i64 = 3_600;

/// Downtime assumed per failure when estimating availability (minutes).
pub const ASSUMED_DOWNTIME_PER_FAILURE_MINUTES: f64 = 5.0;

/// Analytics scheduler wake-up ceiling (seconds). Runs are due-checked on each wake.
pub const SCHEDULER_TICK_SECS: u64 = 300;

/// Time `stop()` waits for loops to drain before aborting them (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

/// Window behind status statistics and the scheduled status report (days).
pub const STATUS_WINDOW_DAYS: u32 = 7;

/// Scheduled analytics windows (days).
pub const SCHEDULED_TREND_DAYS: u32 = 7;
pub const SCHEDULED_PATTERN_DAYS: u32 = 30;
pub const SCHEDULED_PREDICTION_DAYS: u32 = 7;

/// Increasing trend percentage above which the scheduler alerts.
pub const TREND_ALERT_PERCENT: f64 = 20.0;

/// Pattern confidence above which the scheduler alerts.
pub const PATTERN_ALERT_CONFIDENCE: f64 = 0.8;

/// Report recommendation thresholds.
pub const LOW_RECOVERY_SUCCESS_RATE: f64 = 0.8;
pub const ESCALATION_REVIEW_COUNT: usize = 5;
pub const MIN_AVAILABILITY_PERCENT: f64 = 99.0;

// ============================================================================
// Storage & Server
// ============================================================================

/// Default sled database directory.
pub const DEFAULT_DATA_DIR: &str = "./data/autoheal";

/// Default control API bind address.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8090";
