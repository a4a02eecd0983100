//! Analysis model - aggregates derived from execution history.

use crate::Parameters;
use serde::{Deserialize, Serialize};

/// Result of one learning pass over a skill's history.
///
/// Recomputed on every pass and never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Fraction of successful runs
    pub success_rate: f64,

    /// Mean duration in seconds
    pub avg_duration: f64,

    /// Mean quality score
    pub avg_quality_score: f64,

    /// Best observed value per parameter name
    pub optimal_parameters: Parameters,

    /// Recurring failure groups
    pub failure_patterns: Vec<FailurePattern>,

    /// First-half vs second-half comparison
    pub performance_trend: PerformanceTrend,

    /// Thresholds that were missed
    pub improvement_opportunities: Vec<ImprovementOpportunity>,

    /// Sample-size derived trust in `[0, 1]`
    pub confidence: f64,

    /// Number of records analyzed
    pub sample_size: usize,
}

impl AnalysisResult {
    /// The all-zero result for an empty history.
    pub fn empty() -> Self {
        Self {
            success_rate: 0.0,
            avg_duration: 0.0,
            avg_quality_score: 0.0,
            optimal_parameters: Parameters::new(),
            failure_patterns: Vec::new(),
            performance_trend: PerformanceTrend::insufficient_data(),
            improvement_opportunities: Vec::new(),
            confidence: 0.0,
            sample_size: 0,
        }
    }
}

/// A group of failures sharing the same error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    /// Error message (`"Unknown"` when none was recorded)
    pub error: String,

    /// Occurrences in the analyzed window
    pub count: usize,

    /// `count` divided by the total number of runs
    pub frequency: f64,

    /// Parameter pairs present in every occurrence
    pub common_parameters: Parameters,
}

/// Direction of the performance trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Later runs succeed more often
    Improving,
    /// Later runs succeed as often or less often
    Declining,
    /// Too few runs to compare
    InsufficientData,
}

/// Trend comparison between the first and second half of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrend {
    /// Direction
    pub direction: TrendDirection,

    /// Second-half success rate minus first-half
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate_delta: Option<f64>,

    /// Second-half mean quality minus first-half
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_delta: Option<f64>,
}

impl PerformanceTrend {
    /// Trend for a history that is too short.
    pub fn insufficient_data() -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            success_rate_delta: None,
            quality_delta: None,
        }
    }
}

/// Which aggregate missed its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    SuccessRate,
    QualityScore,
    Performance,
}

/// A missed threshold with a target and a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementOpportunity {
    /// Kind
    pub kind: OpportunityKind,
    /// Current value
    pub current: f64,
    /// Target value
    pub target: f64,
    /// What to try
    pub suggestion: String,
}
