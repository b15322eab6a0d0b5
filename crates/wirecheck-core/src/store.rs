//! Persistent call-graph store
//!
//! Each repository's subgraph is an immutable snapshot behind an `Arc`. A
//! re-map builds and validates the replacement completely, persists it, and
//! only then swaps it in, so readers see either the old graph or the new one.
//! Writers are serialized per repository; readers never wait on them.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GraphError, StoreError};
use crate::graph::{EntrySource, RepoGraph};
use crate::model::{FunctionId, RepoId, RepositoryModel};
use crate::policy::Policy;
use crate::reachability::{ModuleReport, ReachabilityEngine, ReachabilityStatus};

/// One committed revision of a repository's production graph.
#[derive(Debug)]
pub struct RepoSnapshot {
    pub repo: RepoId,
    pub revision: String,
    pub mapped_at: DateTime<Utc>,
    pub graph: RepoGraph,
    policy: Option<String>,
}

impl RepoSnapshot {
    pub fn new(
        repo: RepoId,
        revision: impl Into<String>,
        model: RepositoryModel,
        policy: Option<String>,
    ) -> Result<Self, GraphError> {
        Self::assemble(repo, revision.into(), Utc::now(), model, policy)
    }

    fn assemble(
        repo: RepoId,
        revision: String,
        mapped_at: DateTime<Utc>,
        model: RepositoryModel,
        policy: Option<String>,
    ) -> Result<Self, GraphError> {
        let resolved = policy.as_deref().map(Policy::parse_lenient).unwrap_or_default();
        let graph = RepoGraph::build_with_policy(model, &resolved)?;
        Ok(RepoSnapshot {
            repo,
            revision,
            mapped_at,
            graph,
            policy,
        })
    }

    /// The policy document in force when this revision was mapped.
    pub fn policy_text(&self) -> Option<&str> {
        self.policy.as_deref()
    }
}

/// On-disk form of a snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSnapshot {
    repo: RepoId,
    revision: String,
    mapped_at: DateTime<Utc>,
    policy: Option<String>,
    model: RepositoryModel,
}

/// Entry point as reported by `query_entry_points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPointInfo {
    pub function: FunctionId,
    pub qualified_name: String,
    pub file: PathBuf,
    #[serde(flatten)]
    pub source: EntrySource,
}

/// Result of a committed re-map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSummary {
    pub repo: RepoId,
    pub revision: String,
    pub files: usize,
    pub functions: usize,
    pub edges: usize,
    pub entry_points: usize,
}

/// Read-only access to the store. The change-analysis path only ever holds this.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn snapshot(&self, repo: &RepoId) -> Result<Option<Arc<RepoSnapshot>>, StoreError>;

    async fn require_snapshot(&self, repo: &RepoId) -> Result<Arc<RepoSnapshot>, StoreError> {
        self.snapshot(repo)
            .await?
            .ok_or_else(|| StoreError::NotMapped(repo.clone()))
    }

    async fn query_reachability(
        &self,
        repo: &RepoId,
        targets: &[FunctionId],
        engine: &ReachabilityEngine,
    ) -> Result<BTreeMap<FunctionId, ReachabilityStatus>, StoreError> {
        let snapshot = self.require_snapshot(repo).await?;
        Ok(engine.classify(&snapshot.graph, targets))
    }

    async fn query_all_unreachable(
        &self,
        repo: &RepoId,
        module_filter: Option<&str>,
        engine: &ReachabilityEngine,
    ) -> Result<Vec<ModuleReport>, StoreError> {
        let snapshot = self.require_snapshot(repo).await?;
        Ok(engine.unreachable_exports(&snapshot.graph, module_filter))
    }

    async fn query_entry_points(&self, repo: &RepoId) -> Result<Vec<EntryPointInfo>, StoreError> {
        let snapshot = self.require_snapshot(repo).await?;
        let graph = &snapshot.graph;
        let mut entries: Vec<EntryPointInfo> = graph
            .entry_points()
            .iter()
            .filter_map(|entry| {
                let function = graph.function(entry.function)?;
                Some(EntryPointInfo {
                    function: function.id,
                    qualified_name: function.qualified_name.clone(),
                    file: function.file.clone(),
                    source: entry.source.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.file, &a.qualified_name).cmp(&(&b.file, &b.qualified_name)));
        Ok(entries)
    }
}

/// Full access, including the whole-repository write used by re-maps.
#[async_trait]
pub trait GraphStore: GraphReader {
    /// Atomically replace the repository's subgraph. On any failure the
    /// previously committed snapshot stays visible and untouched.
    async fn replace_repository_subgraph(
        &self,
        repo: &RepoId,
        revision: &str,
        model: RepositoryModel,
        policy: Option<String>,
    ) -> Result<ReplaceSummary, StoreError>;
}

/// Snapshot store with optional JSON persistence under a directory.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: DashMap<RepoId, Arc<RepoSnapshot>>,
    write_locks: DashMap<RepoId, Arc<Mutex<()>>>,
    dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        SnapshotStore::default()
    }

    /// Open (creating if needed) a persistent store and load its snapshots.
    /// Corrupt snapshot files are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = SnapshotStore {
            dir: Some(dir.clone()),
            ..SnapshotStore::default()
        };

        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_snapshot(&path) {
                Ok(snapshot) => {
                    debug!("Loaded snapshot for {} at {}", snapshot.repo, snapshot.revision);
                    store.snapshots.insert(snapshot.repo.clone(), Arc::new(snapshot));
                }
                Err(e) => warn!("Skipping unreadable snapshot {}: {}", path.display(), e),
            }
        }

        info!("Opened graph store at {} ({} repositories)", dir.display(), store.snapshots.len());
        Ok(store)
    }

    pub fn repositories(&self) -> Vec<RepoId> {
        let mut repos: Vec<RepoId> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        repos.sort();
        repos
    }

    fn writer_lock(&self, repo: &RepoId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(repo.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn snapshot_path(dir: &Path, repo: &RepoId) -> PathBuf {
        dir.join(format!("{}.json", repo.slug()))
    }

    async fn persist(&self, snapshot: &RepoSnapshot) -> Result<(), StoreError> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let persisted = PersistedSnapshot {
            repo: snapshot.repo.clone(),
            revision: snapshot.revision.clone(),
            mapped_at: snapshot.mapped_at,
            policy: snapshot.policy.clone(),
            model: snapshot.graph.model().clone(),
        };
        let target = Self::snapshot_path(&dir, &snapshot.repo);

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let encoded = serde_json::to_vec(&persisted)?;
            let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
            staged.write_all(&encoded)?;
            staged.as_file().sync_all()?;
            staged.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("persistence task failed: {e}")))?
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<RepoSnapshot> {
    let text = std::fs::read_to_string(path)?;
    let persisted: PersistedSnapshot = serde_json::from_str(&text)?;
    let snapshot = RepoSnapshot::assemble(
        persisted.repo,
        persisted.revision,
        persisted.mapped_at,
        persisted.model,
        persisted.policy,
    )?;
    Ok(snapshot)
}

#[async_trait]
impl GraphReader for SnapshotStore {
    async fn snapshot(&self, repo: &RepoId) -> Result<Option<Arc<RepoSnapshot>>, StoreError> {
        Ok(self.snapshots.get(repo).map(|entry| Arc::clone(entry.value())))
    }
}

#[async_trait]
impl GraphStore for SnapshotStore {
    async fn replace_repository_subgraph(
        &self,
        repo: &RepoId,
        revision: &str,
        model: RepositoryModel,
        policy: Option<String>,
    ) -> Result<ReplaceSummary, StoreError> {
        let lock = self.writer_lock(repo);
        let _writer = lock.lock().await;

        let snapshot = RepoSnapshot::new(repo.clone(), revision, model, policy).map_err(|source| {
            StoreError::Inconsistent {
                repo: repo.clone(),
                source,
            }
        })?;
        self.persist(&snapshot).await?;

        let summary = ReplaceSummary {
            repo: repo.clone(),
            revision: revision.to_string(),
            files: snapshot.graph.file_count(),
            functions: snapshot.graph.function_count(),
            edges: snapshot.graph.edge_count(),
            entry_points: snapshot.graph.entry_points().len(),
        };
        self.snapshots.insert(repo.clone(), Arc::new(snapshot));

        info!(
            "Committed {} at {}: {} files, {} functions, {} edges, {} entry points",
            repo, revision, summary.files, summary.functions, summary.edges, summary.entry_points
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FunctionId;
    use crate::test_utils::ModelBuilder;

    fn widget_model() -> (RepositoryModel, FunctionId, FunctionId) {
        let mut b = ModelBuilder::new();
        let create = b.export("src/widgets.ts", "createWidget");
        let validate = b.export("src/validation.ts", "validateWidget");
        b.call(create, validate);
        b.endpoint("src/app.ts", "POST", "/widgets", create);
        (b.build(), create, validate)
    }

    #[tokio::test]
    async fn test_replace_and_query() {
        let store = SnapshotStore::in_memory();
        let repo = RepoId::new("acme/widgets");
        let (model, create, validate) = widget_model();

        let summary = store.replace_repository_subgraph(&repo, "abc123", model, None).await.unwrap();
        assert_eq!(summary.functions, 2);
        assert_eq!(summary.entry_points, 1);

        let engine = ReachabilityEngine::default();
        let statuses = store.query_reachability(&repo, &[create, validate], &engine).await.unwrap();
        assert_eq!(statuses[&validate], ReachabilityStatus::Reachable);

        let entries = store.query_entry_points(&repo).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].qualified_name, "createWidget");
    }

    #[tokio::test]
    async fn test_unmapped_repository() {
        let store = SnapshotStore::in_memory();
        let repo = RepoId::new("acme/unknown");
        assert!(store.snapshot(&repo).await.unwrap().is_none());
        let err = store.query_entry_points(&repo).await.unwrap_err();
        assert!(matches!(err, StoreError::NotMapped(_)));
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_graph() {
        let store = SnapshotStore::in_memory();
        let repo = RepoId::new("acme/widgets");
        let (model, _, _) = widget_model();
        store.replace_repository_subgraph(&repo, "v1", model, None).await.unwrap();

        let mut broken = ModelBuilder::new();
        let a = broken.export("src/a.ts", "a");
        broken.call(a, FunctionId(7));
        let err = store
            .replace_repository_subgraph(&repo, "v2", broken.build(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent { .. }));

        let snapshot = store.require_snapshot(&repo).await.unwrap();
        assert_eq!(snapshot.revision, "v1");
        assert_eq!(snapshot.graph.function_count(), 2);
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot() {
        let store = SnapshotStore::in_memory();
        let repo = RepoId::new("acme/widgets");
        let (model, _, _) = widget_model();
        store.replace_repository_subgraph(&repo, "v1", model, None).await.unwrap();
        let held = store.require_snapshot(&repo).await.unwrap();

        let mut next = ModelBuilder::new();
        next.export("src/only.ts", "only");
        store.replace_repository_subgraph(&repo, "v2", next.build(), None).await.unwrap();

        assert_eq!(held.revision, "v1");
        assert_eq!(held.graph.function_count(), 2);
        assert_eq!(held.graph.edge_count(), 1);
        let current = store.require_snapshot(&repo).await.unwrap();
        assert_eq!(current.graph.function_count(), 1);
        assert_eq!(current.graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_serialize() {
        let store = Arc::new(SnapshotStore::in_memory());
        let repo = RepoId::new("acme/widgets");
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let (model, _, _) = widget_model();
                store.replace_repository_subgraph(&repo, &format!("v{i}"), model, None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let snapshot = store.require_snapshot(&repo).await.unwrap();
        assert_eq!(snapshot.graph.function_count(), 2);
        assert_eq!(snapshot.graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_persisted_snapshots_reload() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RepoId::new("acme/widgets");
        {
            let store = SnapshotStore::open(dir.path()).unwrap();
            let (model, _, _) = widget_model();
            let policy = "entry_points:\n  - \"src/validation.ts:validateWidget\"\n".to_string();
            store.replace_repository_subgraph(&repo, "abc", model, Some(policy)).await.unwrap();
        }
        std::fs::write(dir.path().join("garbage.json"), "{not json").unwrap();

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.repositories(), vec![repo.clone()]);
        let snapshot = reopened.require_snapshot(&repo).await.unwrap();
        assert_eq!(snapshot.revision, "abc");
        assert_eq!(snapshot.graph.entry_points().len(), 2);
        assert!(snapshot.policy_text().is_some());
    }

    #[tokio::test]
    async fn test_similar_repository_ids_persist_separately() {
        let dir = tempfile::tempdir().unwrap();
        let first = RepoId::new("acme/a_b");
        let second = RepoId::new("acme_a/b");
        {
            let store = SnapshotStore::open(dir.path()).unwrap();
            let (model, _, _) = widget_model();
            store.replace_repository_subgraph(&first, "one", model, None).await.unwrap();
            let mut other = ModelBuilder::new();
            other.export("src/only.ts", "only");
            store.replace_repository_subgraph(&second, "two", other.build(), None).await.unwrap();
        }

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.repositories(), vec![first.clone(), second.clone()]);
        assert_eq!(reopened.require_snapshot(&first).await.unwrap().revision, "one");
        assert_eq!(reopened.require_snapshot(&second).await.unwrap().graph.function_count(), 1);
    }
}
