//! autoheal: Self-Healing Control Loop
//!
//! Detects sustained component failures, drives them through staged
//! automated recovery, and hands what automation cannot fix to a human.
//!
//! ## Architecture
//!
//! - **Failure Detector**: polls registered health probes, scores consecutive failures
//! - **Auto Recovery Engine**: runs a failure type's remedial actions under rate limits
//! - **Session Orchestrator**: staged retry state machine (immediate → delayed → escalated)
//! - **Alert Dispatcher**: priority routing, cooldown suppression, multi-channel fan-out
//! - **Failure Analytics**: trends, patterns, predictions and root cause over history
//! - **Control Plane**: wires the above, supervises their loops, exposes operator controls

// Control loop modules
pub mod config;
pub mod types;
pub mod storage;
pub mod rate_limiter;
pub mod detector;
pub mod recovery;
pub mod orchestrator;
pub mod alerts;
pub mod analytics;
pub mod control_plane;
pub mod api;

// Re-export configuration
pub use config::AutohealConfig;

// Re-export commonly used types
pub use types::{
    AlertChannel, AlertPriority, AlertType, FailureEvent, FailureType, RecoveryAction, RecoveryResult,
    RecoverySession, RecoveryStage, SessionStatus, Severity,
};

// Re-export the components
pub use alerts::AlertDispatcher;
pub use analytics::FailureAnalyticsEngine;
pub use control_plane::ControlPlane;
pub use detector::{FailureDetector, HealthProbe};
pub use orchestrator::RecoverySessionOrchestrator;
pub use recovery::{AutoRecoveryEngine, RecoveryActionExecutor};

// Re-export storage
pub use storage::{StorageError, Store};
