//! Reflection engine - loads a skill's history window and analyzes it.

use std::sync::Arc;

use crate::{Learner, LearnerConfig};
use skilltune_core::{AnalysisResult, SkillId, Time};
use skilltune_storage::Storage;
use tracing::{debug, info};

/// Configuration for the reflection engine.
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// Number of most recent records to analyze (`None` = whole history)
    pub analysis_window: Option<usize>,
    /// Learner thresholds
    pub learner: LearnerConfig,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            analysis_window: Some(100),
            learner: LearnerConfig::default(),
        }
    }
}

/// Runs the learner over stored history.
pub struct ReflectionEngine {
    storage: Arc<dyn Storage>,
    learner: Learner,
    config: ReflectionConfig,
}

impl ReflectionEngine {
    /// Create a new reflection engine.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            learner: Learner::new(),
            config: ReflectionConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReflectionConfig) -> Self {
        self.learner = Learner::new().with_config(config.learner.clone());
        self.config = config;
        self
    }

    /// The learner used for analysis.
    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    /// Analyze the recent history of a skill.
    pub async fn reflect_on(&self, skill: &SkillId) -> Result<ReflectionReport, anyhow::Error> {
        let history = self.storage.load_history(skill, self.config.analysis_window).await?;
        debug!("Reflecting on {} records of {}", history.len(), skill);

        let analysis = self.learner.analyze(&history);

        info!(
            "Analysis of {}: success_rate={:.2}, avg_quality={:.2}, confidence={:.1}",
            skill, analysis.success_rate, analysis.avg_quality_score, analysis.confidence
        );

        Ok(ReflectionReport {
            skill_id: skill.clone(),
            analyzed: history.len(),
            analysis,
            generated_at: chrono::Utc::now(),
        })
    }
}

/// Report produced by one reflection.
#[derive(Debug, Clone)]
pub struct ReflectionReport {
    /// The skill that was analyzed
    pub skill_id: SkillId,
    /// Number of records analyzed
    pub analyzed: usize,
    /// The derived statistics
    pub analysis: AnalysisResult,
    /// When the report was generated
    pub generated_at: Time,
}
