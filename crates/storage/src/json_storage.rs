//! JSON file storage implementation.
//!
//! Layout under the storage root:
//!
//! ```text
//! history/<skill>.jsonl                      one ExecutionMetrics per line
//! knowledge/<skill>/best_practices.json      replaced wholesale
//! knowledge/<skill>/optimization_rules.json  replaced wholesale
//! snapshots/<skill>/<version>.snap           raw configuration bytes
//! snapshots/<skill>/<version>.meta.json      ConfigSnapshot marker
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use skilltune_core::{
    BestPractice, ConfigSnapshot, ExecutionMetrics, OptimizationRule, SkillId, SnapshotVersion,
};
use super::{Storage, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const PRACTICES_FILE: &str = "best_practices.json";
const RULES_FILE: &str = "optimization_rules.json";

/// Per-skill async locks.
#[derive(Default)]
struct SkillLocks(std::sync::Mutex<HashMap<SkillId, Arc<Mutex<()>>>>);

impl SkillLocks {
    fn get(&self, skill: &SkillId) -> Arc<Mutex<()>> {
        let mut map = self.0.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(skill.clone()).or_default().clone()
    }
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    history_locks: SkillLocks,
    knowledge_locks: SkillLocks,
}

impl JsonStorage {
    /// Create storage, creating the directories it needs under `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("history")).await?;
        fs::create_dir_all(root.join("knowledge")).await?;
        fs::create_dir_all(root.join("snapshots")).await?;

        Ok(Self {
            root,
            history_locks: SkillLocks::default(),
            knowledge_locks: SkillLocks::default(),
        })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn history_path(&self, skill: &SkillId) -> PathBuf {
        self.root.join("history").join(format!("{}.jsonl", skill))
    }
    fn knowledge_dir(&self, skill: &SkillId) -> PathBuf {
        self.root.join("knowledge").join(skill.as_str())
    }
    fn snapshot_dir(&self, skill: &SkillId) -> PathBuf {
        self.root.join("snapshots").join(skill.as_str())
    }
    fn snapshot_path(&self, skill: &SkillId, version: SnapshotVersion) -> PathBuf {
        self.snapshot_dir(skill).join(format!("{}.snap", version))
    }
    fn snapshot_meta_path(&self, skill: &SkillId, version: SnapshotVersion) -> PathBuf {
        self.snapshot_dir(skill).join(format!("{}.meta.json", version))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn append_metrics(&self, metrics: &ExecutionMetrics) -> Result<()> {
        let mut line = serde_json::to_string(metrics)?;
        line.push('\n');

        let lock = self.history_locks.get(&metrics.skill_id);
        let _guard = lock.lock().await;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(&metrics.skill_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn load_history(&self, skill: &SkillId, limit: Option<usize>) -> Result<Vec<ExecutionMetrics>> {
        let path = self.history_path(skill);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut history = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionMetrics>(line) {
                Ok(metrics) => history.push(metrics),
                Err(e) => warn!("Skipping unreadable history line {} for {}: {}", lineno + 1, skill, e),
            }
        }

        if let Some(limit) = limit {
            let skip = history.len().saturating_sub(limit);
            history.drain(..skip);
        }
        Ok(history)
    }

    async fn history_len(&self, skill: &SkillId) -> Result<usize> {
        // Same records load_history returns, unreadable lines excluded.
        Ok(self.load_history(skill, None).await?.len())
    }

    async fn store_knowledge(
        &self,
        skill: &SkillId,
        practices: &[BestPractice],
        rules: &[OptimizationRule],
    ) -> Result<()> {
        let dir = self.knowledge_dir(skill);
        let practices_json = serde_json::to_string_pretty(practices)?;
        let rules_json = serde_json::to_string_pretty(rules)?;

        let lock = self.knowledge_locks.get(skill);
        let _guard = lock.lock().await;

        fs::create_dir_all(&dir).await?;

        // Both documents are staged before either is replaced.
        let practices_tmp = dir.join(format!("{}.tmp", PRACTICES_FILE));
        let rules_tmp = dir.join(format!("{}.tmp", RULES_FILE));
        fs::write(&practices_tmp, practices_json.as_bytes()).await?;
        if let Err(e) = fs::write(&rules_tmp, rules_json.as_bytes()).await {
            let _ = fs::remove_file(&practices_tmp).await;
            return Err(e.into());
        }

        // The two renames are not atomic as a pair. Both stay in one
        // directory, so only a vanished directory can split them.
        fs::rename(&practices_tmp, dir.join(PRACTICES_FILE)).await?;
        if let Err(e) = fs::rename(&rules_tmp, dir.join(RULES_FILE)).await {
            let _ = fs::remove_file(&rules_tmp).await;
            return Err(e.into());
        }

        debug!(
            "Stored {} best practices and {} optimization rules for {}",
            practices.len(),
            rules.len(),
            skill
        );
        Ok(())
    }

    async fn load_best_practices(&self, skill: &SkillId) -> Result<Vec<BestPractice>> {
        Ok(read_json(&self.knowledge_dir(skill).join(PRACTICES_FILE)).await?.unwrap_or_default())
    }

    async fn load_optimization_rules(&self, skill: &SkillId) -> Result<Vec<OptimizationRule>> {
        Ok(read_json(&self.knowledge_dir(skill).join(RULES_FILE)).await?.unwrap_or_default())
    }

    async fn save_snapshot(&self, snapshot: &ConfigSnapshot, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(self.snapshot_dir(&snapshot.skill_id)).await?;

        // Bytes first: a snapshot is only listed once its marker exists.
        fs::write(self.snapshot_path(&snapshot.skill_id, snapshot.version), contents).await?;
        let meta = serde_json::to_string_pretty(snapshot)?;
        fs::write(
            self.snapshot_meta_path(&snapshot.skill_id, snapshot.version),
            meta.as_bytes(),
        )
        .await?;
        Ok(())
    }

    async fn load_snapshot(&self, skill: &SkillId, version: SnapshotVersion) -> Result<Option<Vec<u8>>> {
        if fs::metadata(self.snapshot_meta_path(skill, version)).await.is_err() {
            return Ok(None);
        }
        match fs::read(self.snapshot_path(skill, version)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_snapshots(&self, skill: &SkillId) -> Result<Vec<ConfigSnapshot>> {
        let dir = self.snapshot_dir(skill);
        let mut snapshots: Vec<ConfigSnapshot> = match fs::metadata(&dir).await {
            Ok(_) => list_meta(&dir).await?,
            Err(_) => Vec::new(),
        };
        snapshots.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(snapshots)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_meta<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let is_meta = path
            .file_name()
            .and_then(|s| s.to_str())
            .map_or(false, |name| name.ends_with(".meta.json"));
        if !is_meta {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable snapshot marker {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skilltune_core::ConfigAction;

    fn skill(name: &str) -> SkillId {
        SkillId::new(name).unwrap()
    }

    fn record(name: &str, n: u64) -> ExecutionMetrics {
        let mut params = skilltune_core::Parameters::new();
        params.insert("n".to_string(), json!(n));
        ExecutionMetrics::new(skill(name), n % 2 == 0, n as f64, 0.5).with_parameters(params)
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let s = skill("layout");

        assert!(storage.load_history(&s, None).await.unwrap().is_empty());

        for n in 0..5 {
            storage.append_metrics(&record("layout", n)).await.unwrap();
        }

        let all = storage.load_history(&s, None).await.unwrap();
        let ns: Vec<u64> = all.iter().map(|m| m.parameters["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);

        let tail = storage.load_history(&s, Some(2)).await.unwrap();
        let ns: Vec<u64> = tail.iter().map(|m| m.parameters["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![3, 4]);

        assert_eq!(storage.load_history(&s, Some(50)).await.unwrap().len(), 5);
        assert_eq!(storage.history_len(&s).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_history_survives_reopen_and_skills_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            storage.append_metrics(&record("alpha", 1)).await.unwrap();
            storage.append_metrics(&record("beta", 2)).await.unwrap();
            storage.append_metrics(&record("beta", 3)).await.unwrap();
        }

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert_eq!(storage.load_history(&skill("alpha"), None).await.unwrap().len(), 1);
        assert_eq!(storage.load_history(&skill("beta"), None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for n in 0..64 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.append_metrics(&record("busy", n)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = storage.load_history(&skill("busy"), None).await.unwrap();
        assert_eq!(history.len(), 64);
        let mut ns: Vec<u64> = history.iter().map(|m| m.parameters["n"].as_u64().unwrap()).collect();
        ns.sort_unstable();
        assert_eq!(ns, (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unreadable_history_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.append_metrics(&record("layout", 1)).await.unwrap();

        let path = dir.path().join("history").join("layout.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        std::fs::write(&path, content).unwrap();
        storage.append_metrics(&record("layout", 2)).await.unwrap();

        let history = storage.load_history(&skill("layout"), None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(storage.history_len(&skill("layout")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_staging_keeps_previous_knowledge() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let s = skill("layout");

        let practice = BestPractice::general("optimal_x", "use x=5", skilltune_core::Parameters::new());
        storage.store_knowledge(&s, &[practice.clone()], &[]).await.unwrap();

        // A directory in the way of the staged rules file makes staging fail
        let knowledge = dir.path().join("knowledge").join("layout");
        std::fs::create_dir(knowledge.join("optimization_rules.json.tmp")).unwrap();

        let replacement = BestPractice::general("optimal_y", "use y=2", skilltune_core::Parameters::new());
        assert!(storage.store_knowledge(&s, &[replacement], &[]).await.is_err());

        assert_eq!(storage.load_best_practices(&s).await.unwrap(), vec![practice]);
        assert!(!knowledge.join("best_practices.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_store_knowledge_replaces_documents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let s = skill("layout");

        assert!(storage.load_best_practices(&s).await.unwrap().is_empty());
        assert!(storage.load_optimization_rules(&s).await.unwrap().is_empty());

        let mut actions = skilltune_core::Parameters::new();
        actions.insert("x".to_string(), json!(5));
        let practice = BestPractice::general("optimal_x", "use x=5", actions);
        let rule = OptimizationRule::config(
            "improve_success_rate",
            "retry_config",
            ConfigAction::Add,
            json!({"max_retries": 3, "retry_delay": 1}),
            0.7,
            0.15,
        );

        storage.store_knowledge(&s, &[practice.clone()], &[rule.clone()]).await.unwrap();
        assert_eq!(storage.load_best_practices(&s).await.unwrap(), vec![practice]);
        assert_eq!(storage.load_optimization_rules(&s).await.unwrap(), vec![rule]);

        storage.store_knowledge(&s, &[], &[]).await.unwrap();
        assert!(storage.load_best_practices(&s).await.unwrap().is_empty());
        assert!(storage.load_optimization_rules(&s).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let s = skill("layout");
        let mut generator = ulid::Generator::new();

        assert!(storage.list_snapshots(&s).await.unwrap().is_empty());

        let mut versions = Vec::new();
        for i in 0..3u8 {
            let version = SnapshotVersion::next(&mut generator).unwrap();
            let contents = vec![b'a' + i; 4];
            let snapshot = ConfigSnapshot {
                skill_id: s.clone(),
                version,
                created_at: chrono::Utc::now(),
                size_bytes: contents.len() as u64,
            };
            storage.save_snapshot(&snapshot, &contents).await.unwrap();
            versions.push(version);
        }

        let listed: Vec<SnapshotVersion> = storage
            .list_snapshots(&s)
            .await
            .unwrap()
            .into_iter()
            .map(|snap| snap.version)
            .collect();
        assert_eq!(listed, vec![versions[2], versions[1], versions[0]]);

        assert_eq!(storage.load_snapshot(&s, versions[1]).await.unwrap(), Some(b"bbbb".to_vec()));

        let unknown = SnapshotVersion::next(&mut generator).unwrap();
        assert_eq!(storage.load_snapshot(&s, unknown).await.unwrap(), None);
    }
}
