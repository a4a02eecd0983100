//! Learning pass and the per-skill background worker.
//!
//! One pass runs the whole pipeline:
//!
//! ```text
//! Analyze → Extract → Store → (Apply)
//! ```
//!
//! Passes for the same skill never overlap: the worker drains its queue one
//! request at a time and manual passes take the same lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use skilltune_core::{BestPractice, SkillId};
use skilltune_evolution::{Adapter, ApplyOutcome, Evolver};
use skilltune_reflection::ReflectionEngine;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::TuningContext;

/// Manual passes need at least this many records.
pub const MANUAL_LEARNING_MIN_EXECUTIONS: usize = 5;

/// Best practices shared between a performer and its learning pass.
pub(crate) type PracticeCache = Arc<std::sync::Mutex<Vec<BestPractice>>>;

/// Summary of one learning pass.
#[derive(Debug, Clone, Serialize)]
pub struct LearningSummary {
    /// Records analyzed
    pub analyzed: usize,
    /// Success rate of the analyzed window
    pub success_rate: f64,
    /// Mean quality of the analyzed window
    pub avg_quality_score: f64,
    /// Analysis confidence
    pub confidence: f64,
    /// Best practices stored
    pub practices: usize,
    /// Optimization rules stored
    pub rules: usize,
    /// Result of auto-applying the rules, if attempted
    pub apply: Option<ApplyOutcome>,
}

/// Result of a manually requested pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManualLearning {
    /// The pass ran
    Completed(LearningSummary),
    /// Too few records to learn from
    InsufficientData {
        /// Records available
        count: usize,
    },
    /// Evolution is switched off
    Disabled,
}

/// The learn → evolve → adapt pipeline for one skill.
pub struct LearningPass {
    ctx: Arc<TuningContext>,
    skill_id: SkillId,
    reflection: ReflectionEngine,
    evolver: Evolver,
    adapter: Adapter,
    practices: PracticeCache,
    running: Mutex<()>,
}

impl LearningPass {
    /// Create the pipeline for a skill and its configuration document.
    pub async fn new(
        ctx: Arc<TuningContext>,
        skill_id: SkillId,
        config_path: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let adapter = ctx.adapter(&skill_id, config_path)?;
        let evolver = ctx.evolver(&skill_id);
        let practices = match evolver.load_best_practices().await {
            Ok(practices) => practices,
            Err(e) => {
                warn!("Failed to load best practices for {}: {}, starting without", skill_id, e);
                Vec::new()
            }
        };

        Ok(Self {
            reflection: ctx.reflection(),
            evolver,
            adapter,
            practices: Arc::new(std::sync::Mutex::new(practices)),
            running: Mutex::new(()),
            skill_id,
            ctx,
        })
    }

    /// Skill this pass learns for.
    pub fn skill_id(&self) -> &SkillId {
        &self.skill_id
    }

    /// Adapter for the skill's configuration document.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub(crate) fn practices(&self) -> PracticeCache {
        self.practices.clone()
    }

    /// Run one pass over the recent history.
    ///
    /// A failing stage ends the pass; knowledge is only written after
    /// analysis and extraction have both completed.
    pub async fn run(&self) -> anyhow::Result<LearningSummary> {
        let _running = self.running.lock().await;

        let report = self
            .reflection
            .reflect_on(&self.skill_id)
            .await
            .context("analyze stage")?;
        let analysis = report.analysis;
        info!("Learning pass for {} over {} records", self.skill_id, report.analyzed);

        let mut practices = self.evolver.extract_best_practices(&analysis);
        let rules = self.evolver.generate_optimization_rules(&analysis);
        info!(
            "Extracted {} best practices and {} optimization rules for {}",
            practices.len(),
            rules.len(),
            self.skill_id
        );

        carry_over_usage(&self.practices.lock().unwrap_or_else(|e| e.into_inner()), &mut practices);
        self.evolver
            .store_knowledge(&practices, &rules)
            .await
            .context("store stage")?;

        let mut summary = LearningSummary {
            analyzed: report.analyzed,
            success_rate: analysis.success_rate,
            avg_quality_score: analysis.avg_quality_score,
            confidence: analysis.confidence,
            practices: practices.len(),
            rules: rules.len(),
            apply: None,
        };
        self.refresh_cache(practices);

        if rules.is_empty() {
            return Ok(summary);
        }
        if self.ctx.config().evolution.optimization.auto_optimize {
            let outcome = self
                .adapter
                .apply_optimizations(rules, true)
                .await
                .context("apply stage")?;
            info!("Auto-applied rules for {}: applied={}", self.skill_id, outcome.applied());
            summary.apply = Some(outcome);
        } else {
            info!("{} optimization rules for {} await approval", rules.len(), self.skill_id);
        }

        Ok(summary)
    }

    /// Run a pass on request, if there is enough data.
    pub async fn run_manual(&self) -> anyhow::Result<ManualLearning> {
        if !self.ctx.config().enabled() {
            return Ok(ManualLearning::Disabled);
        }

        let count = self.ctx.storage().history_len(&self.skill_id).await?;
        if count < MANUAL_LEARNING_MIN_EXECUTIONS {
            info!(
                "Not enough history for {}: {} < {}",
                self.skill_id, count, MANUAL_LEARNING_MIN_EXECUTIONS
            );
            return Ok(ManualLearning::InsufficientData { count });
        }

        Ok(ManualLearning::Completed(self.run().await?))
    }

    /// Swap in freshly stored practices.
    ///
    /// Counters are carried over again under the same lock as the swap, so
    /// runs that matched while the pass was storing keep their increments.
    fn refresh_cache(&self, mut practices: Vec<BestPractice>) {
        let mut cache = self.practices.lock().unwrap_or_else(|e| e.into_inner());
        carry_over_usage(&cache, &mut practices);
        *cache = practices;
    }
}

/// Keep usage counters of practices that survive a pass.
fn carry_over_usage(cache: &[BestPractice], practices: &mut [BestPractice]) {
    let applied: HashMap<&str, u64> = cache.iter().map(|p| (p.id.as_str(), p.times_applied)).collect();
    for practice in practices.iter_mut() {
        if let Some(times) = applied.get(practice.id.as_str()) {
            practice.times_applied = *times;
        }
    }
}

/// A queued request for a background pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LearningRequest {
    /// History length when the request was made
    pub history_len: usize,
}

/// Spawn the worker that drains a skill's learning queue.
pub(crate) fn spawn_worker(
    pass: Arc<LearningPass>,
    capacity: usize,
) -> (mpsc::Sender<LearningRequest>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<LearningRequest>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            debug!(
                "Learning request for {} at {} records",
                pass.skill_id(),
                request.history_len
            );
            if let Err(e) = pass.run().await {
                error!("Learning pass for {} failed: {:#}", pass.skill_id(), e);
            }
        }
        debug!("Learning worker for {} stopped", pass.skill_id());
    });

    (tx, handle)
}
