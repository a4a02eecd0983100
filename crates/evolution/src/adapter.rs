//! Adapter - applies optimization rules to a configuration document.
//!
//! Every mutating batch runs inside the skill's critical section:
//!
//! ```text
//! read bytes → skip rules already in effect → snapshot bytes → apply each rule → write back
//! ```
//!
//! so the whole batch can be reverted with a single [`Adapter::rollback_to`].

use std::sync::Arc;

use crate::document::{get_path, set_path};
use crate::{AdapterError, ConfigDocument};
use serde::Serialize;
use serde_json::Value;
use skilltune_core::{
    ConfigAction, ConfigSnapshot, OptimizationRule, Parameters, RuleKind, SkillId, SnapshotVersion,
};
use skilltune_storage::Storage;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Result of [`Adapter::apply_optimizations`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Auto-apply was off; the rules await approval
    Pending {
        /// Rules awaiting approval
        rules: Vec<OptimizationRule>,
    },
    /// Rules were processed
    Processed(ApplyReport),
}

impl ApplyOutcome {
    /// Whether at least one rule changed the document.
    pub fn applied(&self) -> bool {
        match self {
            ApplyOutcome::Pending { .. } => false,
            ApplyOutcome::Processed(report) => report.applied,
        }
    }
}

/// Per-rule results of an applied batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// At least one rule was applied
    pub applied: bool,
    /// Snapshot taken before mutating (absent when nothing needed changing)
    pub snapshot_version: Option<SnapshotVersion>,
    /// Rules that changed the document
    pub applied_rule_ids: Vec<String>,
    /// Rules that could not be applied
    pub failed_rule_ids: Vec<String>,
    /// Rules whose effect was already present
    pub unchanged_rule_ids: Vec<String>,
    /// What each applied rule changed
    pub changes: Vec<AppliedChange>,
    /// Number of rules submitted
    pub total: usize,
}

/// A single applied mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    /// Rule that caused it
    pub rule_id: String,
    /// Dotted path or root key
    pub target: String,
    /// Value before the change
    pub previous: Option<Value>,
    /// Value after the change (`None` for removals)
    pub value: Option<Value>,
}

/// Applies rules to one skill's configuration document, with snapshots.
pub struct Adapter {
    storage: Arc<dyn Storage>,
    skill_id: SkillId,
    document: ConfigDocument,
    lock: Arc<Mutex<()>>,
    versions: Arc<std::sync::Mutex<ulid::Generator>>,
}

impl Adapter {
    /// Create an adapter with its own lock and version generator.
    pub fn new(storage: Arc<dyn Storage>, skill_id: SkillId, document: ConfigDocument) -> Self {
        Self {
            storage,
            skill_id,
            document,
            lock: Arc::new(Mutex::new(())),
            versions: Arc::new(std::sync::Mutex::new(ulid::Generator::new())),
        }
    }

    /// Share the skill's critical-section lock with other adapters.
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }

    /// Share a process-wide version generator.
    pub fn with_version_generator(mut self, versions: Arc<std::sync::Mutex<ulid::Generator>>) -> Self {
        self.versions = versions;
        self
    }

    /// The configuration document.
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Apply rules to the configuration.
    ///
    /// With `auto_apply == false` nothing is touched and the rules are handed
    /// back as pending. Otherwise a snapshot is taken before the first
    /// mutation and every rule succeeds or fails on its own.
    pub async fn apply_optimizations(
        &self,
        rules: Vec<OptimizationRule>,
        auto_apply: bool,
    ) -> Result<ApplyOutcome, AdapterError> {
        if !auto_apply {
            info!("Auto-apply disabled; {} rules for {} await approval", rules.len(), self.skill_id);
            return Ok(ApplyOutcome::Pending { rules });
        }

        let _guard = self.lock.lock().await;

        let original = self.document.read_bytes().await?;
        let mut doc = self.document.decode(&original)?;

        let mut report = ApplyReport {
            total: rules.len(),
            ..ApplyReport::default()
        };

        let (unchanged, pending): (Vec<_>, Vec<_>) = rules.into_iter().partition(|r| in_effect(&doc, r));
        report.unchanged_rule_ids = unchanged.into_iter().map(|r| r.id).collect();
        if pending.is_empty() {
            info!("All {} rules for {} already in effect", report.total, self.skill_id);
            return Ok(ApplyOutcome::Processed(report));
        }

        report.snapshot_version = Some(self.snapshot_bytes(&original).await?);

        for rule in pending {
            match apply_rule(&mut doc, &rule) {
                Ok(change) => {
                    info!(
                        "Applied {} rule {} to {}: {} {:?} -> {:?}",
                        rule.label(),
                        rule.id,
                        self.skill_id,
                        change.target,
                        change.previous,
                        change.value
                    );
                    report.applied_rule_ids.push(rule.id);
                    report.changes.push(change);
                }
                Err(e) => {
                    warn!("Failed to apply rule {} to {}: {}", rule.id, self.skill_id, e);
                    report.failed_rule_ids.push(rule.id);
                }
            }
        }

        if !report.applied_rule_ids.is_empty() {
            let bytes = self.document.encode(&doc)?;
            self.document.write_bytes(&bytes).await?;
            report.applied = true;
        }

        Ok(ApplyOutcome::Processed(report))
    }

    /// Snapshot the current configuration document.
    pub async fn create_snapshot(&self) -> Result<SnapshotVersion, AdapterError> {
        let _guard = self.lock.lock().await;
        let bytes = self.document.read_bytes().await?;
        self.snapshot_bytes(&bytes).await
    }

    /// Restore the configuration document from a snapshot.
    ///
    /// Returns `false`, leaving the document untouched, when the snapshot
    /// does not exist.
    pub async fn rollback_to(&self, version: SnapshotVersion) -> Result<bool, AdapterError> {
        let _guard = self.lock.lock().await;

        let Some(bytes) = self.storage.load_snapshot(&self.skill_id, version).await? else {
            error!("Snapshot {} of {} does not exist", version, self.skill_id);
            return Ok(false);
        };

        self.document.write_bytes(&bytes).await?;
        info!("Rolled back {} to snapshot {}", self.skill_id, version);
        Ok(true)
    }

    /// Snapshots of this skill, newest first.
    pub async fn list_snapshots(&self) -> Result<Vec<ConfigSnapshot>, AdapterError> {
        Ok(self.storage.list_snapshots(&self.skill_id).await?)
    }

    /// Must be called with the lock held.
    async fn snapshot_bytes(&self, bytes: &[u8]) -> Result<SnapshotVersion, AdapterError> {
        let version = {
            let mut generator = self.versions.lock().unwrap_or_else(|e| e.into_inner());
            SnapshotVersion::next(&mut generator)?
        };
        let snapshot = ConfigSnapshot {
            skill_id: self.skill_id.clone(),
            version,
            created_at: chrono::Utc::now(),
            size_bytes: bytes.len() as u64,
        };
        self.storage.save_snapshot(&snapshot, bytes).await?;
        info!("Created snapshot {} of {}", version, self.skill_id);
        Ok(version)
    }
}

/// Whether applying the rule would leave the document unchanged.
fn in_effect(doc: &Parameters, rule: &OptimizationRule) -> bool {
    match &rule.kind {
        RuleKind::Parameter { target, value, .. } => {
            matches!(get_path(doc, target), Ok(Some(current)) if current == value)
        }
        RuleKind::Config { target, .. } if target.is_empty() => false,
        RuleKind::Config { target, action, value } => match action {
            ConfigAction::Add | ConfigAction::Replace => doc.get(target) == Some(value),
            ConfigAction::Remove => !doc.contains_key(target),
        },
    }
}

fn apply_rule(doc: &mut Parameters, rule: &OptimizationRule) -> Result<AppliedChange, AdapterError> {
    match &rule.kind {
        RuleKind::Parameter { target, value, .. } => {
            let previous = set_path(doc, target, value.clone())?;
            Ok(AppliedChange {
                rule_id: rule.id.clone(),
                target: target.clone(),
                previous,
                value: Some(value.clone()),
            })
        }
        RuleKind::Config { target, action, value } => {
            if target.is_empty() {
                return Err(AdapterError::InvalidPath(target.clone()));
            }
            let (previous, value) = match action {
                ConfigAction::Add | ConfigAction::Replace => {
                    (doc.insert(target.clone(), value.clone()), Some(value.clone()))
                }
                ConfigAction::Remove => (doc.remove(target), None),
            };
            Ok(AppliedChange {
                rule_id: rule.id.clone(),
                target: target.clone(),
                previous,
                value,
            })
        }
    }
}
