//! Full re-map of a repository's default branch into the graph store

use std::sync::Arc;

use tracing::{debug, info};
use wirecheck_core::config::Settings;
use wirecheck_core::{GraphStore, ParseRepository, RepoId, ReplaceSummary};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::pipeline::parse_checkout;
use crate::retry::RetryPolicy;
use crate::source::RevisionSource;

/// The only writer of the graph store.
pub struct Remapper {
    store: Arc<dyn GraphStore>,
    source: Arc<dyn RevisionSource>,
    parser: Arc<dyn ParseRepository>,
    retry: RetryPolicy,
    policy_file: String,
}

impl Remapper {
    pub fn new(
        store: Arc<dyn GraphStore>,
        source: Arc<dyn RevisionSource>,
        parser: Arc<dyn ParseRepository>,
        settings: &Settings,
    ) -> Self {
        Remapper {
            store,
            source,
            parser,
            retry: RetryPolicy::from_settings(&settings.pipeline),
            policy_file: settings.pipeline.policy_file.clone(),
        }
    }

    pub async fn remap(&self, repo: &RepoId, revision: &str) -> Result<ReplaceSummary, PipelineError> {
        self.remap_with(repo, revision, &CancellationToken::new()).await
    }

    /// Check out, parse and atomically replace the repository's subgraph. Any
    /// failure leaves the previously committed graph in place.
    pub async fn remap_with(
        &self,
        repo: &RepoId,
        revision: &str,
        token: &CancellationToken,
    ) -> Result<ReplaceSummary, PipelineError> {
        let source = &self.source;
        let checkout = self
            .retry
            .run("checkout", move || source.checkout(repo, revision))
            .await?;
        token.check()?;

        let parsed = parse_checkout(&self.parser, &checkout).await?;
        let policy = checkout.read_policy(&self.policy_file).await;
        drop(checkout);
        debug!(
            "Parsed {} at {}: {} files, {} functions",
            repo,
            revision,
            parsed.model.files.len(),
            parsed.model.functions.len()
        );

        // A superseded re-map stops before any write attempt, retries included.
        let (store, model, policy) = (&self.store, &parsed.model, &policy);
        let summary = self
            .retry
            .run("replace subgraph", move || async move {
                token.check()?;
                let summary = store
                    .replace_repository_subgraph(repo, revision, model.clone(), policy.clone())
                    .await?;
                Ok::<_, PipelineError>(summary)
            })
            .await?;
        info!("Re-mapped {} at {}", repo, revision);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wirecheck_core::test_utils::create_test_repo;
    use wirecheck_core::{GraphReader, RepoSnapshot, RepositoryModel, SnapshotStore, StoreError};
    use wirecheck_indexer::Coordinator;

    /// A store that is always down. Each write attempt also supersedes the re-map.
    struct UnavailableStore {
        writes: AtomicU32,
        token: CancellationToken,
    }

    #[async_trait]
    impl GraphReader for UnavailableStore {
        async fn snapshot(&self, _repo: &RepoId) -> Result<Option<Arc<RepoSnapshot>>, StoreError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl GraphStore for UnavailableStore {
        async fn replace_repository_subgraph(
            &self,
            _repo: &RepoId,
            _revision: &str,
            _model: RepositoryModel,
            _policy: Option<String>,
        ) -> Result<ReplaceSummary, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn remapper(store: Arc<SnapshotStore>, source: LocalSource) -> Remapper {
        Remapper::new(store, Arc::new(source), Arc::new(Coordinator::new()), &Settings::default())
    }

    #[tokio::test]
    async fn test_remap_commits_snapshot() {
        let repo = RepoId::new("acme/widgets");
        let tree = create_test_repo();
        let store = Arc::new(SnapshotStore::in_memory());
        let remapper = remapper(Arc::clone(&store), LocalSource::single(repo.clone(), tree.path()));

        let summary = remapper.remap(&repo, "main-1").await.unwrap();
        assert_eq!(summary.files, 6);
        assert_eq!(summary.entry_points, 1);

        let snapshot = store.require_snapshot(&repo).await.unwrap();
        assert_eq!(snapshot.revision, "main-1");
        assert!(snapshot.policy_text().is_none());
    }

    #[tokio::test]
    async fn test_failed_remap_keeps_previous_graph() {
        let repo = RepoId::new("acme/widgets");
        let tree = create_test_repo();
        let store = Arc::new(SnapshotStore::in_memory());
        remapper(Arc::clone(&store), LocalSource::single(repo.clone(), tree.path()))
            .remap(&repo, "main-1")
            .await
            .unwrap();

        let broken = remapper(
            Arc::clone(&store),
            LocalSource::single(repo.clone(), tree.path().join("missing")),
        );
        let err = broken.remap(&repo, "main-2").await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
        assert_eq!(store.require_snapshot(&repo).await.unwrap().revision, "main-1");
    }

    #[tokio::test]
    async fn test_cancelled_remap_writes_nothing() {
        let repo = RepoId::new("acme/widgets");
        let tree = create_test_repo();
        let store = Arc::new(SnapshotStore::in_memory());
        let remapper = remapper(Arc::clone(&store), LocalSource::single(repo.clone(), tree.path()));

        let token = CancellationToken::new();
        token.cancel();
        let err = remapper.remap_with(&repo, "main-1", &token).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(store.snapshot(&repo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_superseded_remap_stops_retrying_the_write() {
        let repo = RepoId::new("acme/widgets");
        let tree = create_test_repo();
        let token = CancellationToken::new();
        let store = Arc::new(UnavailableStore {
            writes: AtomicU32::new(0),
            token: token.clone(),
        });
        let remapper = Remapper::new(
            store.clone(),
            Arc::new(LocalSource::single(repo.clone(), tree.path())),
            Arc::new(Coordinator::new()),
            &Settings::default(),
        );

        let err = remapper.remap_with(&repo, "main-2", &token).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }
}
