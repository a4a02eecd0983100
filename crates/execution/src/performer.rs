//! The performer - wraps every invocation of a skill.
//!
//! Runs the per-invocation loop:
//! ```text
//! Apply Practices → Run → Record → (Request Learning)
//! ```

use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use skilltune_core::{ExecutionMetrics, Parameters, SkillId, MAINTAIN_ACTION};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::learning::{spawn_worker, LearningRequest, PracticeCache};
use crate::{EvolutionStatus, LearningPass, ManualLearning, Skill, SkillOutput, TuningContext};

/// What the caller of [`Performer::run`] gets back.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Whether the run succeeded
    pub success: bool,
    /// Payload returned by the skill
    pub data: Value,
    /// Wall-clock duration in seconds
    pub duration: f64,
    /// Error message of a failed run
    pub error: Option<String>,
}

/// Wraps a skill with telemetry, best practices and background learning.
pub struct Performer {
    ctx: Arc<TuningContext>,
    skill: Arc<dyn Skill>,
    pass: Arc<LearningPass>,
    practices: PracticeCache,
    history_len: AtomicUsize,
    queue: Option<mpsc::Sender<LearningRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl Performer {
    /// Create a performer for a skill and its configuration document.
    ///
    /// Loads the stored best practices and history length, and starts the
    /// skill's learning worker when evolution is enabled.
    pub async fn new(
        ctx: Arc<TuningContext>,
        skill: Arc<dyn Skill>,
        config_path: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let skill_id = skill.id().clone();
        let pass = Arc::new(LearningPass::new(ctx.clone(), skill_id.clone(), config_path).await?);
        let history_len = match ctx.storage().history_len(&skill_id).await {
            Ok(len) => len,
            Err(e) => {
                warn!("Failed to read history of {}: {}, counting from 0", skill_id, e);
                0
            }
        };

        let (queue, worker) = if ctx.config().enabled() {
            let capacity = ctx.config().evolution.learning.queue_capacity;
            let (tx, handle) = spawn_worker(pass.clone(), capacity);
            info!("Evolution enabled for {}", skill_id);
            (Some(tx), Some(handle))
        } else {
            info!("Evolution disabled for {}", skill_id);
            (None, None)
        };

        Ok(Self {
            practices: pass.practices(),
            history_len: AtomicUsize::new(history_len),
            ctx,
            skill,
            pass,
            queue,
            worker,
        })
    }

    /// The wrapped skill's id.
    pub fn skill_id(&self) -> &SkillId {
        self.skill.id()
    }

    /// Invoke the skill once.
    ///
    /// Never fails: errors and panics of the skill come back as a failed
    /// [`RunResult`], and telemetry problems are only logged.
    pub async fn run(&self, params: Parameters) -> RunResult {
        let enabled = self.ctx.config().enabled();
        let params = if enabled { self.apply_best_practices(params) } else { params };

        let start = Instant::now();
        let skill = self.skill.clone();
        let call_params = params.clone();
        let outcome = tokio::spawn(async move { skill.execute(call_params).await }).await;
        let duration = start.elapsed().as_secs_f64();

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Skill {} failed: {:#}", self.skill_id(), e);
                SkillOutput::failure(format!("{:#}", e))
            }
            Err(e) => {
                let message = join_error_message(e);
                warn!("Skill {} panicked: {}", self.skill_id(), message);
                SkillOutput::failure(message)
            }
        };

        if enabled {
            self.record(&params, &output, duration).await;
        }

        RunResult {
            success: output.success,
            data: output.data,
            duration,
            error: output.error,
        }
    }

    /// Run a learning pass now, without invoking the skill.
    pub async fn trigger_manual_learning(&self) -> anyhow::Result<ManualLearning> {
        self.pass.run_manual().await
    }

    /// Evolution state of the wrapped skill.
    pub async fn evolution_status(&self) -> anyhow::Result<EvolutionStatus> {
        self.ctx.evolution_status(self.skill_id()).await
    }

    /// Stop accepting learning requests and wait for pending passes.
    pub async fn shutdown(mut self) {
        drop(self.queue.take());
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Learning worker for {} ended abnormally: {}", self.skill_id(), e);
            }
        }
    }

    /// Override call parameters from matching best practices.
    fn apply_best_practices(&self, mut params: Parameters) -> Parameters {
        let mut practices = self.practices.lock().unwrap_or_else(|e| e.into_inner());

        for practice in practices.iter_mut() {
            if !practice.applies_to(&params) {
                continue;
            }
            practice.times_applied += 1;

            for (name, value) in &practice.actions {
                if name == MAINTAIN_ACTION || !params.contains_key(name) {
                    continue;
                }
                debug!("Applying best practice {}: {}={}", practice.id, name, value);
                params.insert(name.clone(), value.clone());
            }
        }

        params
    }

    async fn record(&self, params: &Parameters, output: &SkillOutput, duration: f64) {
        let mut metrics = ExecutionMetrics::new(self.skill_id().clone(), output.success, duration, output.quality_score)
            .with_parameters(params.clone())
            .with_output_metrics(output.output_metrics.clone());
        if let Some(error) = &output.error {
            metrics = metrics.with_error(error.clone());
        }
        if let Some(feedback) = &output.user_feedback {
            metrics = metrics.with_user_feedback(feedback.clone());
        }

        if let Err(e) = self.ctx.storage().append_metrics(&metrics).await {
            warn!("Failed to record execution of {}: {}", self.skill_id(), e);
            return;
        }

        let history_len = self.history_len.fetch_add(1, Ordering::SeqCst) + 1;
        if history_len >= self.ctx.config().evolution.learning.min_executions_for_learning {
            self.request_learning(history_len);
        }
    }

    fn request_learning(&self, history_len: usize) {
        let Some(queue) = &self.queue else {
            return;
        };

        match queue.try_send(LearningRequest { history_len }) {
            Ok(()) => debug!("Queued learning pass for {} at {} records", self.skill_id(), history_len),
            Err(TrySendError::Full(_)) => {
                debug!("Learning pass for {} already pending, request coalesced", self.skill_id())
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Learning worker for {} is gone", self.skill_id())
            }
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload: Box<dyn Any + Send> = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
