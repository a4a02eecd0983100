//! Thresholds used by the learner.

use serde::{Deserialize, Serialize};

/// Thresholds and targets for [`crate::Learner`].
///
/// Every field has a default, so a partial YAML/JSON document only needs to
/// name the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Runs must score strictly above this to inform optimal parameters
    pub optimal_min_quality: f64,
    /// A `(name, value)` pair needs this many qualifying runs
    pub optimal_min_occurrences: usize,
    /// An error needs this many occurrences to become a pattern
    pub failure_min_occurrences: usize,
    /// Runs needed before a trend is reported
    pub trend_min_samples: usize,
    /// Success rate below this is an opportunity
    pub success_rate_threshold: f64,
    /// Target success rate
    pub success_rate_target: f64,
    /// Mean quality below this is an opportunity
    pub quality_threshold: f64,
    /// Target mean quality
    pub quality_target: f64,
    /// Mean duration above this (seconds) is an opportunity
    pub duration_threshold_secs: f64,
    /// Target mean duration (seconds)
    pub duration_target_secs: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            optimal_min_quality: 0.7,
            optimal_min_occurrences: 3,
            failure_min_occurrences: 2,
            trend_min_samples: 5,
            success_rate_threshold: 0.8,
            success_rate_target: 0.85,
            quality_threshold: 0.7,
            quality_target: 0.8,
            duration_threshold_secs: 60.0,
            duration_target_secs: 30.0,
        }
    }
}
