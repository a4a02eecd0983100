//! Evolver - extracts knowledge from an analysis and persists it.

use std::sync::Arc;

use serde_json::{json, Value};
use skilltune_core::{
    AnalysisResult, BestPractice, ConfigAction, OpportunityKind, OptimizationRule, Parameters,
    SkillId, TrendDirection, MAINTAIN_ACTION,
};
use skilltune_storage::{Result, Storage};
use tracing::{debug, info};

/// Practices are only extracted above this success rate.
const PRACTICE_MIN_SUCCESS_RATE: f64 = 0.7;
/// Gain claimed by an optimal-parameter practice.
const PRACTICE_GAIN: f64 = 0.1;
/// Gain claimed by the maintain-configuration practice.
const MAINTAIN_GAIN: f64 = 0.05;
/// Parameter rules are withheld at or below this confidence.
const RULE_MIN_CONFIDENCE: f64 = 0.6;
/// Gain claimed by a parameter rule.
const RULE_GAIN: f64 = 0.1;
/// Success rate below which a retry policy is proposed.
const RETRY_SUCCESS_THRESHOLD: f64 = 0.8;
const RETRY_CONFIDENCE: f64 = 0.7;
const RETRY_GAIN: f64 = 0.15;
const RETRY_TARGET: &str = "retry_config";

/// Derives and stores best practices and optimization rules for one skill.
pub struct Evolver {
    storage: Arc<dyn Storage>,
    skill_id: SkillId,
}

impl Evolver {
    /// Create an evolver for a skill.
    pub fn new(storage: Arc<dyn Storage>, skill_id: SkillId) -> Self {
        Self { storage, skill_id }
    }

    /// Skill this evolver works for.
    pub fn skill_id(&self) -> &SkillId {
        &self.skill_id
    }

    /// Pre-execution guidance from an analysis.
    pub fn extract_best_practices(&self, analysis: &AnalysisResult) -> Vec<BestPractice> {
        let mut practices = Vec::new();

        if analysis.success_rate > PRACTICE_MIN_SUCCESS_RATE {
            for (name, value) in &analysis.optimal_parameters {
                let mut actions = Parameters::new();
                actions.insert(name.clone(), value.clone());

                let mut practice = BestPractice::general(
                    format!("optimal_{}", name),
                    format!("Use optimal parameter {}={}", name, value),
                    actions,
                );
                practice.expected_gain = PRACTICE_GAIN;
                practice.observed_success_rate = analysis.success_rate;
                practices.push(practice);
            }
        }

        if analysis.performance_trend.direction == TrendDirection::Improving {
            let mut actions = Parameters::new();
            actions.insert(MAINTAIN_ACTION.to_string(), Value::from("current_config"));

            let mut practice = BestPractice::general(
                "performance_improving",
                "Current configuration is improving results; keep it",
                actions,
            );
            practice.expected_gain = MAINTAIN_GAIN;
            practice.observed_success_rate = analysis.success_rate;
            practices.push(practice);
        }

        debug!("Extracted {} best practices for {}", practices.len(), self.skill_id);
        practices
    }

    /// Proposed configuration mutations from an analysis.
    ///
    /// Parameter rules are only emitted when the analysis confidence is
    /// above the gate; below it they are withheld entirely.
    pub fn generate_optimization_rules(&self, analysis: &AnalysisResult) -> Vec<OptimizationRule> {
        let mut rules = Vec::new();

        if analysis.confidence > RULE_MIN_CONFIDENCE {
            for (name, value) in &analysis.optimal_parameters {
                rules.push(OptimizationRule::parameter(
                    format!("optimize_{}", name),
                    name.clone(),
                    value.clone(),
                    analysis.confidence,
                    RULE_GAIN,
                ));
            }
        } else if !analysis.optimal_parameters.is_empty() {
            debug!(
                "Withholding {} parameter rules for {}: confidence {:.1} <= {:.1}",
                analysis.optimal_parameters.len(),
                self.skill_id,
                analysis.confidence,
                RULE_MIN_CONFIDENCE
            );
        }

        let low_success = analysis
            .improvement_opportunities
            .iter()
            .any(|o| o.kind == OpportunityKind::SuccessRate);
        if low_success && analysis.success_rate < RETRY_SUCCESS_THRESHOLD {
            rules.push(OptimizationRule::config(
                "improve_success_rate",
                RETRY_TARGET,
                ConfigAction::Add,
                json!({"max_retries": 3, "retry_delay": 1}),
                RETRY_CONFIDENCE,
                RETRY_GAIN,
            ));
        }

        rules
    }

    /// Replace both knowledge documents.
    pub async fn store_knowledge(&self, practices: &[BestPractice], rules: &[OptimizationRule]) -> Result<()> {
        self.storage.store_knowledge(&self.skill_id, practices, rules).await?;
        info!(
            "Stored {} best practices and {} optimization rules for {}",
            practices.len(),
            rules.len(),
            self.skill_id
        );
        Ok(())
    }

    /// Load the stored best practices.
    pub async fn load_best_practices(&self) -> Result<Vec<BestPractice>> {
        self.storage.load_best_practices(&self.skill_id).await
    }

    /// Load the stored optimization rules.
    pub async fn load_optimization_rules(&self) -> Result<Vec<OptimizationRule>> {
        self.storage.load_optimization_rules(&self.skill_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skilltune_core::{ImprovementOpportunity, PerformanceTrend, RuleKind};
    use skilltune_storage::JsonStorage;

    fn analysis(success_rate: f64, confidence: f64, optimal: Value) -> AnalysisResult {
        AnalysisResult {
            success_rate,
            avg_duration: 1.0,
            avg_quality_score: 0.9,
            optimal_parameters: optimal.as_object().cloned().unwrap_or_default(),
            failure_patterns: Vec::new(),
            performance_trend: PerformanceTrend::insufficient_data(),
            improvement_opportunities: Vec::new(),
            confidence,
            sample_size: 10,
        }
    }

    async fn evolver() -> (tempfile::TempDir, Evolver) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        (dir, Evolver::new(storage, SkillId::new("layout").unwrap()))
    }

    #[tokio::test]
    async fn test_practices_from_optimal_parameters() {
        let (_dir, evolver) = evolver().await;

        let practices = evolver.extract_best_practices(&analysis(0.9, 0.5, json!({"x": 5})));
        assert_eq!(practices.len(), 1);
        let p = &practices[0];
        assert_eq!(p.id, "optimal_x");
        assert_eq!(p.actions.get("x"), Some(&json!(5)));
        assert_eq!(p.applicability.get("scope"), Some(&json!("general")));
        assert_eq!(p.expected_gain, 0.1);
        assert_eq!(p.observed_success_rate, 0.9);

        // Success rate must be strictly above 0.7
        assert!(evolver.extract_best_practices(&analysis(0.7, 0.9, json!({"x": 5}))).is_empty());
    }

    #[tokio::test]
    async fn test_improving_trend_adds_maintain_practice() {
        let (_dir, evolver) = evolver().await;
        let mut a = analysis(0.5, 0.5, json!({"x": 5}));
        a.performance_trend = PerformanceTrend {
            direction: TrendDirection::Improving,
            success_rate_delta: Some(0.4),
            quality_delta: Some(0.1),
        };

        let practices = evolver.extract_best_practices(&a);
        assert_eq!(practices.len(), 1);
        assert_eq!(practices[0].id, "performance_improving");
        assert_eq!(practices[0].expected_gain, 0.05);
        assert!(practices[0].actions.contains_key(MAINTAIN_ACTION));
    }

    #[tokio::test]
    async fn test_parameter_rules_gated_by_confidence() {
        let (_dir, evolver) = evolver().await;
        let optimal = json!({"x": 5, "mode": "fast"});

        for confidence in [0.3, 0.5, 0.6] {
            let rules = evolver.generate_optimization_rules(&analysis(1.0, confidence, optimal.clone()));
            assert!(rules.is_empty(), "confidence {} must not emit rules", confidence);
        }

        let rules = evolver.generate_optimization_rules(&analysis(1.0, 0.9, optimal));
        assert_eq!(rules.len(), 2);
        let x = rules.iter().find(|r| r.id == "optimize_x").unwrap();
        assert_eq!(x.confidence, 0.9);
        assert!(matches!(&x.kind, RuleKind::Parameter { target, value, .. } if target == "x" && *value == json!(5)));
    }

    #[tokio::test]
    async fn test_low_success_rate_proposes_retry_policy() {
        let (_dir, evolver) = evolver().await;
        let mut a = analysis(0.5, 0.3, json!({}));
        a.improvement_opportunities.push(ImprovementOpportunity {
            kind: OpportunityKind::SuccessRate,
            current: 0.5,
            target: 0.85,
            suggestion: String::new(),
        });

        let rules = evolver.generate_optimization_rules(&a);
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.id, "improve_success_rate");
        assert_eq!(rule.confidence, 0.7);
        assert_eq!(
            rule.kind,
            RuleKind::Config {
                target: "retry_config".to_string(),
                action: ConfigAction::Add,
                value: json!({"max_retries": 3, "retry_delay": 1}),
            }
        );

        // An empty analysis has no opportunities and proposes nothing
        assert!(evolver.generate_optimization_rules(&AnalysisResult::empty()).is_empty());
    }

    #[tokio::test]
    async fn test_knowledge_round_trip_and_clear() {
        let (_dir, evolver) = evolver().await;
        let a = analysis(0.95, 0.9, json!({"x": 5, "style": {"font": "serif"}}));
        let practices = evolver.extract_best_practices(&a);
        let rules = evolver.generate_optimization_rules(&a);
        assert_eq!(practices.len(), 2);
        assert_eq!(rules.len(), 2);

        evolver.store_knowledge(&practices, &rules).await.unwrap();
        assert_eq!(evolver.load_best_practices().await.unwrap(), practices);
        assert_eq!(evolver.load_optimization_rules().await.unwrap(), rules);

        evolver.store_knowledge(&[], &[]).await.unwrap();
        assert!(evolver.load_best_practices().await.unwrap().is_empty());
        assert!(evolver.load_optimization_rules().await.unwrap().is_empty());
    }
}
