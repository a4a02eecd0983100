//! Execution telemetry - one record per skill invocation.

use crate::{clamp_unit, Parameters, SkillId, Time};
use serde::{Deserialize, Serialize};

/// Outcome of a single skill invocation.
///
/// Written once by the performer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Skill that was invoked
    pub skill_id: SkillId,

    /// When the invocation finished
    pub timestamp: Time,

    /// Whether the skill reported success
    pub success: bool,

    /// Wall-clock duration in seconds
    pub duration: f64,

    /// Output quality in `[0, 1]`
    #[serde(default)]
    pub quality_score: f64,

    /// Parameters the skill actually ran with
    #[serde(default)]
    pub parameters: Parameters,

    /// Skill-specific output measurements
    #[serde(default)]
    pub output_metrics: Parameters,

    /// Failure message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Optional free-form feedback attached by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

impl ExecutionMetrics {
    /// Create a record stamped with the current time.
    ///
    /// Negative or NaN durations become `0` and the quality score is
    /// clamped into `[0, 1]`.
    pub fn new(skill_id: SkillId, success: bool, duration: f64, quality_score: f64) -> Self {
        let duration = if duration.is_nan() { 0.0 } else { duration.max(0.0) };
        Self {
            skill_id,
            timestamp: chrono::Utc::now(),
            success,
            duration,
            quality_score: clamp_unit(quality_score),
            parameters: Parameters::new(),
            output_metrics: Parameters::new(),
            error_message: None,
            user_feedback: None,
        }
    }

    /// Set the recorded parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the output measurements.
    pub fn with_output_metrics(mut self, output_metrics: Parameters) -> Self {
        self.output_metrics = output_metrics;
        self
    }

    /// Set the failure message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Attach user feedback.
    pub fn with_user_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.user_feedback = Some(feedback.into());
        self
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: Time) -> Self {
        self.timestamp = timestamp;
        self
    }
}
