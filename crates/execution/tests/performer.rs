//! End-to-end tuning loop scenarios.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use skilltune_core::{Parameters, RuleKind, SkillId};
use skilltune_execution::{
    EvolutionConfig, ManualLearning, Performer, Skill, SkillOutput, TuningContext,
};
use skilltune_storage::JsonStorage;

/// Succeeds with quality 0.9 unless told otherwise through `mode`.
struct Layout {
    id: SkillId,
}

#[async_trait]
impl Skill for Layout {
    fn id(&self) -> &SkillId {
        &self.id
    }

    async fn execute(&self, params: Parameters) -> Result<SkillOutput, anyhow::Error> {
        match params.get("mode").and_then(Value::as_str) {
            Some("fast") => Err(anyhow::anyhow!("upstream timeout")),
            Some("explode") => panic!("layout engine exploded"),
            _ => Ok(SkillOutput::success(0.9).with_data(json!({"pages": 3}))),
        }
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    ctx: Arc<TuningContext>,
    skill: Arc<Layout>,
}

impl Fixture {
    async fn new(config: EvolutionConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("layout.json"), "{\"x\": 1, \"title\": \"weekly\"}\n").unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().join("data")).await.unwrap());
        Self {
            ctx: Arc::new(TuningContext::new(storage, config)),
            skill: Arc::new(Layout {
                id: SkillId::new("layout").unwrap(),
            }),
            dir,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("layout.json")
    }

    async fn performer(&self) -> Performer {
        Performer::new(self.ctx.clone(), self.skill.clone(), self.config_path())
            .await
            .unwrap()
    }
}

fn params(value: Value) -> Parameters {
    value.as_object().cloned().unwrap()
}

fn config(min_executions: usize, auto_optimize: bool) -> EvolutionConfig {
    let mut config = EvolutionConfig::default();
    config.evolution.learning.min_executions_for_learning = min_executions;
    config.evolution.optimization.auto_optimize = auto_optimize;
    config
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_no_learning_below_threshold() {
    let f = Fixture::new(config(10, true)).await;
    let performer = f.performer().await;

    for _ in 0..9 {
        assert!(performer.run(params(json!({"x": 5}))).await.success);
    }
    performer.shutdown().await;

    let status = f.ctx.evolution_status(&f.skill.id).await.unwrap();
    assert_eq!(status.total_executions, 9);
    assert_eq!(status.best_practices_count, 0);
    assert_eq!(status.optimization_rules_count, 0);
}

#[tokio::test]
async fn test_ten_runs_produce_best_practice() {
    let f = Fixture::new(config(10, false)).await;
    let performer = f.performer().await;

    for _ in 0..10 {
        performer.run(params(json!({"x": 5}))).await;
    }
    performer.shutdown().await;

    let practices = f.ctx.storage().load_best_practices(&f.skill.id).await.unwrap();
    assert_eq!(practices.len(), 1);
    assert_eq!(practices[0].id, "optimal_x");
    assert_eq!(practices[0].actions.get("x"), Some(&json!(5)));

    // Ten samples fall in the 0.7 confidence bucket
    let rules = f.ctx.storage().load_optimization_rules(&f.skill.id).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].confidence, 0.7);

    // Rules are stored for approval, the document is untouched
    assert_eq!(read_json(&f.config_path()), json!({"x": 1, "title": "weekly"}));
}

#[tokio::test]
async fn test_below_ten_samples_no_rule_is_emitted() {
    let f = Fixture::new(config(5, true)).await;
    let performer = f.performer().await;

    for _ in 0..9 {
        performer.run(params(json!({"x": 5}))).await;
    }
    performer.shutdown().await;

    let practices = f.ctx.storage().load_best_practices(&f.skill.id).await.unwrap();
    assert_eq!(practices.len(), 1);
    assert!(f.ctx.storage().load_optimization_rules(&f.skill.id).await.unwrap().is_empty());
    assert!(f.ctx.storage().list_snapshots(&f.skill.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_twenty_runs_emit_and_apply_rule() {
    let f = Fixture::new(config(10, true)).await;
    let original = std::fs::read(f.config_path()).unwrap();
    let performer = f.performer().await;

    for _ in 0..20 {
        performer.run(params(json!({"x": 5}))).await;
    }
    performer.shutdown().await;

    let rules = f.ctx.storage().load_optimization_rules(&f.skill.id).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "optimize_x");
    assert_eq!(rules[0].confidence, 0.9);
    assert!(matches!(&rules[0].kind, RuleKind::Parameter { target, value, .. } if target == "x" && *value == json!(5)));

    assert_eq!(read_json(&f.config_path()), json!({"x": 5, "title": "weekly"}));

    // Exactly one batch changed the document; later passes found it in effect
    let status = f.ctx.evolution_status(&f.skill.id).await.unwrap();
    assert_eq!(status.snapshots_count, 1);
    let snapshot = status.latest_snapshot.unwrap();

    let adapter = f.ctx.adapter(&f.skill.id, f.config_path()).unwrap();
    assert!(adapter.rollback_to(snapshot.version).await.unwrap());
    assert_eq!(std::fs::read(f.config_path()).unwrap(), original);
}

#[tokio::test]
async fn test_shared_failures_form_one_pattern() {
    let f = Fixture::new(config(100, false)).await;
    let performer = f.performer().await;

    for _ in 0..4 {
        let result = performer.run(params(json!({"mode": "fast", "x": 5}))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("upstream timeout"));
    }
    for _ in 0..2 {
        assert!(performer.run(params(json!({"mode": "slow"}))).await.success);
    }
    performer.shutdown().await;

    let report = f.ctx.reflection().reflect_on(&f.skill.id).await.unwrap();
    let patterns = &report.analysis.failure_patterns;
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].error, "upstream timeout");
    assert_eq!(patterns[0].count, 4);
    assert!((patterns[0].frequency - 4.0 / 6.0).abs() < 1e-9);
    assert_eq!(patterns[0].common_parameters, params(json!({"mode": "fast", "x": 5})));
}

#[tokio::test]
async fn test_panicking_skill_becomes_failed_result() {
    let f = Fixture::new(config(10, false)).await;
    let performer = f.performer().await;

    let result = performer.run(params(json!({"mode": "explode"}))).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("layout engine exploded"));

    // The performer keeps working after a panic
    assert!(performer.run(params(json!({}))).await.success);
    performer.shutdown().await;

    let history = f.ctx.storage().load_history(&f.skill.id, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].success);
    assert_eq!(history[0].quality_score, 0.0);
    assert!(history[0].error_message.as_deref().unwrap().contains("layout engine exploded"));
}

#[tokio::test]
async fn test_practices_refresh_after_learning() {
    let f = Fixture::new(config(5, false)).await;
    let performer = f.performer().await;

    for _ in 0..5 {
        performer.run(params(json!({"x": 5}))).await;
    }
    // Manual passes serialize with the worker, so the cache is current afterwards
    let ManualLearning::Completed(summary) = performer.trigger_manual_learning().await.unwrap() else {
        panic!("expected a completed pass");
    };
    assert_eq!(summary.practices, 1);

    let result = performer.run(params(json!({"x": 1}))).await;
    assert_eq!(result.data, json!({"pages": 3}));
    let history = f.ctx.storage().load_history(&f.skill.id, Some(1)).await.unwrap();
    assert_eq!(history[0].parameters, params(json!({"x": 5})));
    performer.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_runs_are_all_recorded() {
    let f = Fixture::new(config(1000, false)).await;
    let performer = Arc::new(f.performer().await);

    let mut handles = Vec::new();
    for i in 0..32 {
        let performer = performer.clone();
        handles.push(tokio::spawn(async move {
            performer.run(params(json!({"i": i}))).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    let history = f.ctx.storage().load_history(&f.skill.id, None).await.unwrap();
    assert_eq!(history.len(), 32);
}

#[tokio::test]
async fn test_corrupt_knowledge_does_not_block_runs() {
    let f = Fixture::new(config(10, false)).await;
    let knowledge = f.dir.path().join("data").join("knowledge").join("layout");
    std::fs::create_dir_all(&knowledge).unwrap();
    std::fs::write(knowledge.join("best_practices.json"), "[{truncated").unwrap();

    let performer = f.performer().await;
    let result = performer.run(params(json!({"x": 1}))).await;
    assert!(result.success);
    performer.shutdown().await;

    let history = f.ctx.storage().load_history(&f.skill.id, None).await.unwrap();
    assert_eq!(history[0].parameters, params(json!({"x": 1})));
}

#[tokio::test]
async fn test_unreadable_history_at_startup_does_not_block_runs() {
    let f = Fixture::new(config(1, false)).await;
    // A directory where the history log should be fails every read and write
    std::fs::create_dir_all(f.dir.path().join("data").join("history").join("layout.jsonl")).unwrap();

    let performer = f.performer().await;
    assert!(performer.run(params(json!({"x": 5}))).await.success);
    performer.shutdown().await;
}

#[tokio::test]
async fn test_telemetry_failure_keeps_invocation_and_skips_learning() {
    let f = Fixture::new(config(1, false)).await;
    let performer = f.performer().await;
    std::fs::create_dir_all(f.dir.path().join("data").join("history").join("layout.jsonl")).unwrap();

    for _ in 0..3 {
        let result = performer.run(params(json!({"x": 5}))).await;
        assert!(result.success);
        assert_eq!(result.data, json!({"pages": 3}));
    }
    performer.shutdown().await;

    // Nothing was recorded, so no pass ran and no knowledge was written
    let knowledge = f.dir.path().join("data").join("knowledge").join("layout");
    assert!(!knowledge.join("best_practices.json").exists());
    assert!(!knowledge.join("optimization_rules.json").exists());
}

#[tokio::test]
async fn test_failing_apply_stage_stays_in_background() {
    let f = Fixture::new(config(10, true)).await;
    let performer = f.performer().await;
    std::fs::remove_file(f.config_path()).unwrap();

    for _ in 0..25 {
        assert!(performer.run(params(json!({"x": 5}))).await.success);
    }
    performer.shutdown().await;

    // Knowledge is complete; only the apply stage failed
    let practices = f.ctx.storage().load_best_practices(&f.skill.id).await.unwrap();
    let rules = f.ctx.storage().load_optimization_rules(&f.skill.id).await.unwrap();
    assert_eq!(practices.len(), 1);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].confidence, 0.9);

    assert!(f.ctx.storage().list_snapshots(&f.skill.id).await.unwrap().is_empty());
    assert!(!f.config_path().exists());
}
