//! SkillTune core data models.
//!
//! This crate defines the records that flow through the adaptive tuning
//! loop: execution telemetry, derived analysis, and the knowledge artifacts
//! (best practices and optimization rules) produced from it.

#![warn(missing_docs)]

// Core identities
mod id;
mod error;

// Telemetry and analysis
mod metrics;
mod analysis;

// Knowledge and configuration versioning
mod knowledge;
mod snapshot;

// Re-exports
pub use id::{SkillId, SnapshotVersion};
pub use error::CoreError;

pub use metrics::ExecutionMetrics;
pub use analysis::{
    AnalysisResult, FailurePattern, PerformanceTrend, TrendDirection,
    ImprovementOpportunity, OpportunityKind,
};
pub use knowledge::{
    BestPractice, OptimizationRule, RuleKind, ParameterAction, ConfigAction,
    GENERAL_SCOPE_KEY, GENERAL_SCOPE_VALUE, MAINTAIN_ACTION,
};
pub use snapshot::ConfigSnapshot;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Free-form parameter map passed to and recorded for a skill invocation.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Clamp a ratio into `[0, 1]`. NaN collapses to `0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
