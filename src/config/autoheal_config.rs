//! Root configuration structs and the TOML loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::{AlertType, FailureType, RecoveryAction};

/// Root configuration for one control plane.
///
/// Load with `AutohealConfig::load()` which searches:
/// 1. `$AUTOHEAL_CONFIG` env var
/// 2. `./autoheal.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutohealConfig {
    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Runtime-tunable switches and intervals
    #[serde(default)]
    pub control: ControlSettings,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Probes registered by the binary at startup
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,

    /// Remediation hooks registered by the binary at startup
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl AutohealConfig {
    /// Load configuration using the standard search order:
    /// 1. `$AUTOHEAL_CONFIG` environment variable
    /// 2. `./autoheal.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("AUTOHEAL_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), probes = config.probes.len(), "Loaded config from AUTOHEAL_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from AUTOHEAL_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "AUTOHEAL_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("autoheal.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(path = %local.display(), probes = config.probes.len(), "Loaded config");
                    return config;
                }
                Err(e) => {
                    warn!(path = %local.display(), error = %e, "Failed to load autoheal.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Parse and validate a config file. Unknown keys are logged, not rejected.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for warning in super::validation::validate_unknown_keys(contents) {
            warn!(field = %warning.field, "{}", warning);
        }
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every value, collecting all problems rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let d = &self.detector;
        if d.poll_interval_secs == 0 {
            errors.push("detector.poll_interval_secs must be > 0".to_string());
        }
        if d.failure_threshold == 0 {
            errors.push("detector.failure_threshold must be >= 1".to_string());
        }
        if d.probe_timeout_secs == 0 {
            errors.push("detector.probe_timeout_secs must be > 0".to_string());
        }
        if d.event_queue_capacity == 0 {
            errors.push("detector.event_queue_capacity must be > 0".to_string());
        }

        let r = &self.recovery;
        if r.max_executions_per_hour == 0 {
            errors.push("recovery.max_executions_per_hour must be >= 1".to_string());
        }
        if r.action_timeout_secs == 0 {
            errors.push("recovery.action_timeout_secs must be > 0".to_string());
        }
        for key in r.strategies.keys() {
            if key.parse::<FailureType>().is_err() {
                errors.push(format!("recovery.strategies: unknown failure type '{}'", key));
            }
        }

        if self.orchestrator.poll_interval_secs == 0 {
            errors.push("orchestrator.poll_interval_secs must be > 0".to_string());
        }

        let a = &self.alerts;
        if a.chat.enabled && a.chat.webhook_url.is_empty() {
            errors.push("alerts.chat.webhook_url is required when chat is enabled".to_string());
        }
        if a.email.enabled && (a.email.relay_url.is_empty() || a.email.recipients.is_empty()) {
            errors.push("alerts.email needs relay_url and at least one recipient when enabled".to_string());
        }
        if a.webhook.enabled && a.webhook.url.is_empty() {
            errors.push("alerts.webhook.url is required when the webhook channel is enabled".to_string());
        }
        for key in a.cooldowns.keys() {
            if parse_alert_type(key).is_none() {
                errors.push(format!("alerts.cooldowns: unknown alert type '{}'", key));
            }
        }

        if self.analytics.min_pattern_frequency == 0 {
            errors.push("analytics.min_pattern_frequency must be >= 1".to_string());
        }

        let c = &self.control;
        for (name, value) in [
            ("health_check_interval", c.health_check_interval),
            ("analytics_interval", c.analytics_interval),
            ("status_report_interval", c.status_report_interval),
        ] {
            if value == 0 {
                errors.push(format!("control.{} must be > 0", name));
            }
        }

        for (i, probe) in self.probes.iter().enumerate() {
            if probe.name.trim().is_empty() {
                errors.push(format!("probes[{}].name must not be empty", i));
            }
            if probe.interval_secs == 0 {
                errors.push(format!("probes[{}] ({}) interval_secs must be > 0", i, probe.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Parse an alert type from its snake_case identifier.
pub fn parse_alert_type(s: &str) -> Option<AlertType> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Detector
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_poll")]
    pub poll_interval_secs: u64,

    /// Consecutive unhealthy polls before a failure event is created
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_loop_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,
}

fn default_detector_poll() -> u64 {
    defaults::DETECTOR_POLL_INTERVAL_SECS
}
fn default_failure_threshold() -> u32 {
    defaults::FAILURE_THRESHOLD
}
fn default_probe_timeout() -> u64 {
    defaults::PROBE_TIMEOUT_SECS
}
fn default_loop_backoff() -> u64 {
    defaults::LOOP_ERROR_BACKOFF_SECS
}
fn default_queue_capacity() -> usize {
    defaults::EVENT_QUEUE_CAPACITY
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_detector_poll(),
            failure_threshold: default_failure_threshold(),
            probe_timeout_secs: default_probe_timeout(),
            error_backoff_secs: default_loop_backoff(),
            event_queue_capacity: default_queue_capacity(),
        }
    }
}

// ============================================================================
// Recovery
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub cooldown_secs: u64,
    pub max_executions_per_hour: u32,
    pub action_timeout_secs: u64,
    /// Per failure type override of the built-in action list
    pub strategies: BTreeMap<String, Vec<RecoveryAction>>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::ACTION_COOLDOWN_SECS,
            max_executions_per_hour: defaults::MAX_ACTION_EXECUTIONS_PER_HOUR,
            action_timeout_secs: defaults::ACTION_TIMEOUT_SECS,
            strategies: BTreeMap::new(),
        }
    }
}

impl RecoveryConfig {
    /// Strategy overrides keyed by parsed failure type; invalid keys are dropped.
    pub fn strategy_overrides(&self) -> BTreeMap<FailureType, Vec<RecoveryAction>> {
        self.strategies
            .iter()
            .filter_map(|(k, v)| k.parse::<FailureType>().ok().map(|t| (t, v.clone())))
            .collect()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::ORCHESTRATOR_POLL_INTERVAL_SECS,
            error_backoff_secs: defaults::LOOP_ERROR_BACKOFF_SECS,
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub chat: ChatChannelConfig,
    pub email: EmailChannelConfig,
    pub sms: SmsChannelConfig,
    pub webhook: WebhookChannelConfig,
    pub log: LogChannelConfig,
    /// Outbound request timeout for HTTP transports (seconds)
    pub request_timeout_secs: u64,
    /// Cooldown override per alert type (seconds)
    pub cooldowns: BTreeMap<String, u64>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            chat: ChatChannelConfig::default(),
            email: EmailChannelConfig::default(),
            sms: SmsChannelConfig::default(),
            webhook: WebhookChannelConfig::default(),
            log: LogChannelConfig::default(),
            request_timeout_secs: defaults::ALERT_HTTP_TIMEOUT_SECS,
            cooldowns: BTreeMap::new(),
        }
    }
}

impl AlertsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cooldown_overrides(&self) -> BTreeMap<String, Duration> {
        self.cooldowns
            .iter()
            .map(|(k, v)| (k.clone(), Duration::from_secs(*v)))
            .collect()
    }
}

/// Slack-compatible incoming webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatChannelConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

/// HTTP mail relay accepting `{from, to, subject, text}` JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailChannelConfig {
    pub enabled: bool,
    pub relay_url: String,
    pub api_token: Option<String>,
    pub from: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsChannelConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChannelConfig {
    pub enabled: bool,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogChannelConfig {
    pub enabled: bool,
}

impl Default for LogChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub min_pattern_frequency: usize,
    pub cascade_window_secs: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            min_pattern_frequency: defaults::MIN_PATTERN_FREQUENCY,
            cascade_window_secs: defaults::CASCADE_WINDOW_SECS,
        }
    }
}

// ============================================================================
// Control Settings
// ============================================================================

/// Switches and intervals that may be changed while the control plane runs.
///
/// Field names double as the keys accepted by `update_configuration`.
/// Intervals are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub enable_auto_recovery: bool,
    pub enable_alerts: bool,
    pub enable_analytics: bool,
    pub health_check_interval: u64,
    pub analytics_interval: u64,
    pub status_report_interval: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            enable_auto_recovery: true,
            enable_alerts: true,
            enable_analytics: true,
            health_check_interval: defaults::HEALTH_CHECK_INTERVAL_SECS,
            analytics_interval: defaults::ANALYTICS_INTERVAL_SECS,
            status_report_interval: defaults::STATUS_REPORT_INTERVAL_SECS,
        }
    }
}

impl ControlSettings {
    /// Keys accepted by runtime configuration updates.
    pub const KEYS: [&'static str; 6] = [
        "enable_auto_recovery",
        "enable_alerts",
        "enable_analytics",
        "health_check_interval",
        "analytics_interval",
        "status_report_interval",
    ];
}

// ============================================================================
// Storage & Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_server_addr() }
    }
}

// ============================================================================
// Probe & Action Declarations
// ============================================================================

/// A probe declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ProbeKind,
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_probe_interval() -> u64 {
    defaults::PROBE_INTERVAL_SECS
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    /// GET `url`; healthy when the status equals `expected_status` (any 2xx if unset)
    Http { url: String, expected_status: Option<u16> },
    /// Healthy when a TCP connection to `address` succeeds
    Tcp { address: String },
}

/// A remediation hook: POST the failure event as JSON to `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action: RecoveryAction,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}
