//! Storage trait abstraction.

use async_trait::async_trait;
use skilltune_core::{
    BestPractice, ConfigSnapshot, ExecutionMetrics, OptimizationRule, SkillId, SnapshotVersion,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for SkillTune data.
///
/// Every document is keyed by [`SkillId`], so several tuned skills can share
/// one backend without colliding. Implementations must be safe to call from
/// concurrent tasks: appends for the same skill are serialized and never
/// interleave mid-record.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Execution history ===

    /// Append one record to the skill's history.
    ///
    /// The record is durable once this returns.
    async fn append_metrics(&self, metrics: &ExecutionMetrics) -> Result<()>;

    /// Load the history oldest→newest, or only the most recent `limit` records.
    async fn load_history(&self, skill: &SkillId, limit: Option<usize>) -> Result<Vec<ExecutionMetrics>>;

    /// Number of readable records in the skill's history, matching what
    /// [`Storage::load_history`] returns without a limit.
    async fn history_len(&self, skill: &SkillId) -> Result<usize>;

    // === Knowledge ===

    /// Replace both knowledge documents of a skill.
    async fn store_knowledge(
        &self,
        skill: &SkillId,
        practices: &[BestPractice],
        rules: &[OptimizationRule],
    ) -> Result<()>;

    /// Load the best-practices document (empty if absent).
    async fn load_best_practices(&self, skill: &SkillId) -> Result<Vec<BestPractice>>;

    /// Load the optimization-rules document (empty if absent).
    async fn load_optimization_rules(&self, skill: &SkillId) -> Result<Vec<OptimizationRule>>;

    // === Snapshots ===

    /// Persist a snapshot and its raw configuration bytes.
    async fn save_snapshot(&self, snapshot: &ConfigSnapshot, contents: &[u8]) -> Result<()>;

    /// Load the raw bytes of a snapshot.
    async fn load_snapshot(&self, skill: &SkillId, version: SnapshotVersion) -> Result<Option<Vec<u8>>>;

    /// List a skill's snapshots, newest first.
    async fn list_snapshots(&self, skill: &SkillId) -> Result<Vec<ConfigSnapshot>>;
}
