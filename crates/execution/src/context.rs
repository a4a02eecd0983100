//! Tuning context - the process-wide wiring shared by every performer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use skilltune_core::{ConfigSnapshot, SkillId};
use skilltune_evolution::{Adapter, AdapterError, ConfigDocument, Evolver};
use skilltune_reflection::ReflectionEngine;
use skilltune_storage::{JsonStorage, Storage};
use tokio::sync::Mutex;

use crate::EvolutionConfig;

/// Shared state for tuning any number of skills.
///
/// Built once per process and handed around as `Arc<TuningContext>`.
/// Everything keyed by skill lives here, so two skills never share a lock
/// and two adapters for the same skill always do.
pub struct TuningContext {
    storage: Arc<dyn Storage>,
    config: EvolutionConfig,
    skill_locks: std::sync::Mutex<HashMap<SkillId, Arc<Mutex<()>>>>,
    versions: Arc<std::sync::Mutex<ulid::Generator>>,
}

impl TuningContext {
    /// Create a context over an existing storage backend.
    pub fn new(storage: Arc<dyn Storage>, config: EvolutionConfig) -> Self {
        Self {
            storage,
            config,
            skill_locks: std::sync::Mutex::new(HashMap::new()),
            versions: Arc::new(std::sync::Mutex::new(ulid::Generator::new())),
        }
    }

    /// Open JSON storage under `data_dir` and load the evolution config.
    pub async fn open(data_dir: impl AsRef<Path>, evolution_config: Option<&Path>) -> anyhow::Result<Arc<Self>> {
        let storage = JsonStorage::new(data_dir).await?;
        let config = evolution_config.map(EvolutionConfig::load).unwrap_or_default();
        Ok(Arc::new(Self::new(Arc::new(storage), config)))
    }

    /// Storage backend.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Evolution configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// The critical-section lock of a skill's configuration document.
    pub fn skill_lock(&self, skill: &SkillId) -> Arc<Mutex<()>> {
        let mut locks = self.skill_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(skill.clone()).or_default().clone()
    }

    /// Reflection engine configured from the learning settings.
    pub fn reflection(&self) -> ReflectionEngine {
        ReflectionEngine::new(self.storage.clone()).with_config(self.config.reflection())
    }

    /// Evolver for a skill.
    pub fn evolver(&self, skill: &SkillId) -> Evolver {
        Evolver::new(self.storage.clone(), skill.clone())
    }

    /// Adapter for a skill's configuration document, sharing the skill lock
    /// and the snapshot version generator.
    pub fn adapter(&self, skill: &SkillId, config_path: impl Into<PathBuf>) -> Result<Adapter, AdapterError> {
        let document = ConfigDocument::new(config_path)?;
        Ok(Adapter::new(self.storage.clone(), skill.clone(), document)
            .with_lock(self.skill_lock(skill))
            .with_version_generator(self.versions.clone()))
    }

    /// Evolution state of a skill.
    pub async fn evolution_status(&self, skill: &SkillId) -> anyhow::Result<EvolutionStatus> {
        if !self.config.enabled() {
            return Ok(EvolutionStatus::default());
        }

        let snapshots = self.storage.list_snapshots(skill).await?;
        Ok(EvolutionStatus {
            enabled: true,
            total_executions: self.storage.history_len(skill).await?,
            best_practices_count: self.storage.load_best_practices(skill).await?.len(),
            optimization_rules_count: self.storage.load_optimization_rules(skill).await?.len(),
            snapshots_count: snapshots.len(),
            latest_snapshot: snapshots.into_iter().next(),
        })
    }
}

/// Evolution state of one skill.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvolutionStatus {
    /// Evolution enabled in the configuration
    pub enabled: bool,
    /// Recorded executions
    pub total_executions: usize,
    /// Stored best practices
    pub best_practices_count: usize,
    /// Stored optimization rules
    pub optimization_rules_count: usize,
    /// Configuration snapshots
    pub snapshots_count: usize,
    /// Most recent snapshot
    pub latest_snapshot: Option<ConfigSnapshot>,
}
