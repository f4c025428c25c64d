//! Analytic artifacts: trends, patterns, predictions, root-cause analyses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{FailureType, Severity};

// ============================================================================
// Trend
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
            TrendDirection::Volatile => write!(f, "volatile"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendAnalysis {
    pub period_days: u32,
    pub total_failures: usize,
    pub failures_per_day: f64,
    pub daily_counts: Vec<u32>,
    pub direction: TrendDirection,
    /// Signed slope relative to the daily mean, in percent
    pub trend_percentage: f64,
    pub most_frequent_failure: Option<FailureType>,
    pub most_affected_component: Option<String>,
    pub severity_distribution: BTreeMap<Severity, usize>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Patterns
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Time,
    Combination,
    Cascade,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailurePattern {
    pub pattern_id: String,
    pub pattern_type: PatternType,
    pub description: String,
    pub frequency: usize,
    pub components: Vec<String>,
    pub failure_types: Vec<FailureType>,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub recovery_success_rate: f64,
    pub avg_recovery_minutes: f64,
}

// ============================================================================
// Prediction
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub id: Uuid,
    pub component: String,
    pub predicted_failure_type: FailureType,
    pub probability: f64,
    pub confidence: f64,
    pub days_ahead: u32,
    /// Failures observed in the 30-day evidence window
    pub recent_failures: usize,
    pub daily_rate: f64,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Root Cause
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationFactor {
    pub factor: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootCauseAnalysis {
    pub failure_event_id: Uuid,
    pub primary_cause: String,
    pub contributing_factors: Vec<String>,
    pub correlations: Vec<CorrelationFactor>,
    pub correlation_score: f64,
    pub similar_incidents: Vec<Uuid>,
    pub preventive_measures: Vec<String>,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureReport {
    pub period_days: u32,
    pub trend: TrendAnalysis,
    pub patterns: Vec<FailurePattern>,
    pub predictions: Vec<Prediction>,
    pub high_risk_components: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Trend,
    Pattern,
    Prediction,
    RootCause,
    Report,
}

/// Immutable snapshot of one analytics run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub generated_at: DateTime<Utc>,
    pub results: serde_json::Value,
}
