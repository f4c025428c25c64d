//! Shared data structures for the self-healing control loop
//!
//! - failure: FailureType, Severity, FailureEvent, ComponentState
//! - recovery: RecoveryAction, RecoveryAttempt, RecoveryStage, RecoverySession
//! - alert: AlertType, AlertPriority, AlertChannel, AlertMessage, AlertDelivery
//! - analytics: TrendAnalysis, FailurePattern, Prediction, RootCauseAnalysis

mod alert;
mod analytics;
mod failure;
mod recovery;

pub use alert::*;
pub use analytics::*;
pub use failure::*;
pub use recovery::*;
