//! The unit of work being tuned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skilltune_core::{Parameters, SkillId};

/// A repeatedly invoked unit of work.
///
/// Implementations report their own success and quality; returning `Err`
/// (or panicking) is recorded as a failed run with the error message.
#[async_trait]
pub trait Skill: Send + Sync + 'static {
    /// Skill identifier, used to key history, knowledge and snapshots.
    fn id(&self) -> &SkillId;

    /// Run once with the given parameters.
    async fn execute(&self, params: Parameters) -> Result<SkillOutput, anyhow::Error>;
}

/// What a skill reports about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
    /// Whether the run succeeded
    pub success: bool,
    /// Self-assessed quality in `[0, 1]`
    pub quality_score: f64,
    /// Skill-specific measurements
    #[serde(default)]
    pub output_metrics: Parameters,
    /// Payload returned to the caller
    #[serde(default)]
    pub data: Value,
    /// Why the run failed, for a soft failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form feedback attached to the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

impl SkillOutput {
    /// A successful run.
    pub fn success(quality_score: f64) -> Self {
        Self {
            success: true,
            quality_score,
            output_metrics: Parameters::new(),
            data: Value::Null,
            error: None,
            user_feedback: None,
        }
    }

    /// A failed run.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            quality_score: 0.0,
            output_metrics: Parameters::new(),
            data: Value::Null,
            error: Some(error.into()),
            user_feedback: None,
        }
    }

    /// Set the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Set the output metrics.
    pub fn with_output_metrics(mut self, output_metrics: Parameters) -> Self {
        self.output_metrics = output_metrics;
        self
    }

    /// Attach feedback.
    pub fn with_user_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.user_feedback = Some(feedback.into());
        self
    }
}
