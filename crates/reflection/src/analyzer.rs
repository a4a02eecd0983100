//! Analyzes execution history and derives aggregate statistics.

use std::collections::{BTreeMap, HashMap};

use crate::LearnerConfig;
use serde_json::Value;
use skilltune_core::{
    AnalysisResult, ExecutionMetrics, FailurePattern, ImprovementOpportunity, OpportunityKind,
    Parameters, PerformanceTrend, TrendDirection, clamp_unit,
};

/// Error label used when a failed run recorded no message.
const UNKNOWN_ERROR: &str = "Unknown";

/// Confidence attached to an analysis of `sample_size` records.
///
/// Step function: `<5 → 0.3`, `<10 → 0.5`, `<20 → 0.7`, otherwise `0.9`.
/// An empty history has no confidence at all.
pub fn confidence_for_sample_size(sample_size: usize) -> f64 {
    match sample_size {
        0 => 0.0,
        1..=4 => 0.3,
        5..=9 => 0.5,
        10..=19 => 0.7,
        _ => 0.9,
    }
}

/// Computes an [`AnalysisResult`] from a skill's history.
pub struct Learner {
    config: LearnerConfig,
}

impl Learner {
    /// Create a learner with default thresholds.
    pub fn new() -> Self {
        Self {
            config: LearnerConfig::default(),
        }
    }

    /// Set the thresholds.
    pub fn with_config(mut self, config: LearnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current thresholds.
    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Analyze a chronologically ordered history.
    pub fn analyze(&self, history: &[ExecutionMetrics]) -> AnalysisResult {
        if history.is_empty() {
            return AnalysisResult::empty();
        }

        let n = history.len() as f64;
        let success_rate = success_rate(history);
        let avg_duration = history.iter().map(|m| m.duration).sum::<f64>() / n;
        let avg_quality_score = history.iter().map(|m| m.quality_score).sum::<f64>() / n;

        AnalysisResult {
            success_rate,
            avg_duration,
            avg_quality_score: clamp_unit(avg_quality_score),
            optimal_parameters: self.optimal_parameters(history),
            failure_patterns: self.failure_patterns(history),
            performance_trend: self.performance_trend(history),
            improvement_opportunities: self.improvement_opportunities(
                success_rate,
                avg_quality_score,
                avg_duration,
            ),
            confidence: confidence_for_sample_size(history.len()),
            sample_size: history.len(),
        }
    }

    /// Best value per parameter among high-quality successful runs.
    ///
    /// Pairs seen in fewer than `optimal_min_occurrences` qualifying runs are
    /// dropped without notice. Ties keep the value seen first.
    fn optimal_parameters(&self, history: &[ExecutionMetrics]) -> Parameters {
        struct Group {
            value: Value,
            total: f64,
            count: usize,
            first_seen: usize,
        }

        let mut groups: BTreeMap<(String, String), Group> = BTreeMap::new();
        let qualifying = history
            .iter()
            .filter(|m| m.success && m.quality_score > self.config.optimal_min_quality);

        for (idx, metrics) in qualifying.enumerate() {
            for (name, value) in &metrics.parameters {
                let group = groups
                    .entry((name.clone(), value.to_string()))
                    .or_insert_with(|| Group {
                        value: value.clone(),
                        total: 0.0,
                        count: 0,
                        first_seen: idx,
                    });
                group.total += metrics.quality_score;
                group.count += 1;
            }
        }

        let mut best: BTreeMap<String, (f64, usize, Value)> = BTreeMap::new();
        for ((name, _), group) in groups {
            if group.count < self.config.optimal_min_occurrences {
                continue;
            }
            let mean = group.total / group.count as f64;
            let better = match best.get(&name) {
                None => true,
                Some((best_mean, best_seen, _)) => {
                    mean > *best_mean || (mean == *best_mean && group.first_seen < *best_seen)
                }
            };
            if better {
                best.insert(name, (mean, group.first_seen, group.value));
            }
        }

        best.into_iter().map(|(name, (_, _, value))| (name, value)).collect()
    }

    /// Failed runs grouped by error message, most frequent first.
    fn failure_patterns(&self, history: &[ExecutionMetrics]) -> Vec<FailurePattern> {
        let mut order: Vec<(String, Vec<&ExecutionMetrics>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for metrics in history.iter().filter(|m| !m.success) {
            let error = metrics
                .error_message
                .clone()
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            match index.get(&error) {
                Some(&i) => order[i].1.push(metrics),
                None => {
                    index.insert(error.clone(), order.len());
                    order.push((error, vec![metrics]));
                }
            }
        }

        let total = history.len() as f64;
        let mut patterns: Vec<FailurePattern> = order
            .into_iter()
            .filter(|(_, occurrences)| occurrences.len() >= self.config.failure_min_occurrences)
            .map(|(error, occurrences)| FailurePattern {
                count: occurrences.len(),
                frequency: occurrences.len() as f64 / total,
                common_parameters: common_parameters(&occurrences),
                error,
            })
            .collect();

        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));
        patterns
    }

    /// Compare the first and second half of the history by position.
    fn performance_trend(&self, history: &[ExecutionMetrics]) -> PerformanceTrend {
        if history.len() < self.config.trend_min_samples.max(2) {
            return PerformanceTrend::insufficient_data();
        }

        let (earlier, recent) = history.split_at(history.len() / 2);
        let earlier_success = success_rate(earlier);
        let recent_success = success_rate(recent);

        let direction = if recent_success > earlier_success {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        };

        PerformanceTrend {
            direction,
            success_rate_delta: Some(recent_success - earlier_success),
            quality_delta: Some(mean_quality(recent) - mean_quality(earlier)),
        }
    }

    fn improvement_opportunities(
        &self,
        success_rate: f64,
        avg_quality: f64,
        avg_duration: f64,
    ) -> Vec<ImprovementOpportunity> {
        let cfg = &self.config;
        let mut opportunities = Vec::new();

        if success_rate < cfg.success_rate_threshold {
            opportunities.push(ImprovementOpportunity {
                kind: OpportunityKind::SuccessRate,
                current: success_rate,
                target: cfg.success_rate_target,
                suggestion: "Review failure patterns; add retries or adjust parameters".to_string(),
            });
        }

        if avg_quality < cfg.quality_threshold {
            opportunities.push(ImprovementOpportunity {
                kind: OpportunityKind::QualityScore,
                current: avg_quality,
                target: cfg.quality_target,
                suggestion: "Reuse the parameter values of high-scoring runs".to_string(),
            });
        }

        if avg_duration > cfg.duration_threshold_secs {
            opportunities.push(ImprovementOpportunity {
                kind: OpportunityKind::Performance,
                current: avg_duration,
                target: cfg.duration_target_secs,
                suggestion: "Parallelize independent steps or cache repeated work".to_string(),
            });
        }

        opportunities
    }
}

impl Default for Learner {
    fn default() -> Self {
        Self::new()
    }
}

fn success_rate(history: &[ExecutionMetrics]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().filter(|m| m.success).count() as f64 / history.len() as f64
}

fn mean_quality(history: &[ExecutionMetrics]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().map(|m| m.quality_score).sum::<f64>() / history.len() as f64
}

/// Key/value pairs shared by every record (intersection).
fn common_parameters(records: &[&ExecutionMetrics]) -> Parameters {
    let Some((first, rest)) = records.split_first() else {
        return Parameters::new();
    };
    first
        .parameters
        .iter()
        .filter(|(key, value)| rest.iter().all(|m| m.parameters.get(*key) == Some(*value)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
