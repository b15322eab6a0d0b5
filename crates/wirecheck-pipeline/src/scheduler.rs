//! Debounced scheduling of re-maps and change analyses
//!
//! Every notification spawns a task that sleeps through the quiet window and
//! then runs. A newer notification for the same `(repository, stream)` unit
//! cancels the pending task's token and aborts it before taking its place, so
//! only the latest revision of a unit is ever analyzed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use wirecheck_core::config::Settings;
use wirecheck_core::{GraphReader, GraphStore, ParseRepository, RepoId};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::pipeline::{AnalysisPipeline, ChangeAction, ChangeEvent, Stream};
use crate::remap::Remapper;
use crate::reporter::VerdictReporter;
use crate::source::RevisionSource;

pub type UnitKey = (RepoId, Stream);

/// Does the work once a unit's quiet window has passed.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn handle(&self, event: ChangeEvent, token: CancellationToken);
}

/// Routes default-branch pushes to the re-map and pull requests to the pipeline.
pub struct Dispatcher {
    remapper: Remapper,
    pipeline: AnalysisPipeline,
}

impl Dispatcher {
    pub fn new(remapper: Remapper, pipeline: AnalysisPipeline) -> Self {
        Dispatcher { remapper, pipeline }
    }

    /// Wire a re-map and a pipeline around one store. The pipeline only
    /// receives the store's read-only side.
    pub fn assemble<S: GraphStore + 'static>(
        store: Arc<S>,
        source: Arc<dyn RevisionSource>,
        parser: Arc<dyn ParseRepository>,
        reporter: Arc<dyn VerdictReporter>,
        settings: &Settings,
    ) -> Self {
        let writer: Arc<dyn GraphStore> = store.clone();
        let reader: Arc<dyn GraphReader> = store;
        let remapper = Remapper::new(writer, Arc::clone(&source), Arc::clone(&parser), settings);
        let pipeline = AnalysisPipeline::new(reader, source, parser, reporter, settings);
        Dispatcher { remapper, pipeline }
    }
}

#[async_trait]
impl ChangeHandler for Dispatcher {
    async fn handle(&self, event: ChangeEvent, token: CancellationToken) {
        match event.stream() {
            Stream::DefaultBranch => {
                match self.remapper.remap_with(&event.repo, &event.revision, &token).await {
                    Ok(_) => {}
                    Err(PipelineError::Cancelled) => debug!("Re-map of {} at {} superseded", event.repo, event.revision),
                    Err(e) => error!("Re-map of {} at {} failed: {}", event.repo, event.revision, e),
                }
            }
            Stream::PullRequest(_) | Stream::Branch(_) => {
                let _ = self.pipeline.run(&event, &token).await;
            }
        }
    }
}

struct Pending {
    generation: u64,
    token: CancellationToken,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Pending {
    /// Stop a superseded run. Proposal runs are read-only and can be
    /// aborted mid-flight; a re-map that already started is only cancelled so
    /// it stops at its next checkpoint instead of mid-write.
    fn supersede(self, key: &UnitKey) {
        self.token.cancel();
        let started = self.running.load(Ordering::SeqCst);
        if !started || key.1.is_proposal() {
            self.handle.abort();
        }
        debug!("Superseded pending run for {} {} (started: {})", key.0, key.1, started);
    }
}

pub struct UpdateScheduler {
    handler: Arc<dyn ChangeHandler>,
    debounce: Duration,
    pending: Arc<DashMap<UnitKey, Pending>>,
    generation: AtomicU64,
}

impl UpdateScheduler {
    pub fn new(handler: Arc<dyn ChangeHandler>, debounce: Duration) -> Self {
        UpdateScheduler {
            handler,
            debounce,
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule `event`, replacing whatever is pending for its unit. A
    /// `closed` action only clears the unit.
    pub fn submit(&self, event: ChangeEvent) {
        let key: UnitKey = (event.repo.clone(), event.stream());

        if event.action == ChangeAction::Closed {
            if let Some((key, previous)) = self.pending.remove(&key) {
                previous.supersede(&key);
            }
            info!("{} {} closed, nothing to analyze", key.0, key.1);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(false));
        // The task waits for its entry to be in the map, so a run that finishes
        // at once still finds and removes it.
        let (start, registered) = oneshot::channel::<()>();

        let handle = tokio::spawn({
            let handler = Arc::clone(&self.handler);
            let pending = Arc::clone(&self.pending);
            let token = token.clone();
            let running = Arc::clone(&running);
            let key = key.clone();
            let debounce = self.debounce;
            async move {
                if registered.await.is_err() {
                    return;
                }
                tokio::time::sleep(debounce).await;
                if token.is_cancelled() {
                    return;
                }
                running.store(true, Ordering::SeqCst);
                debug!("Quiet window over for {} {}, running {}", key.0, key.1, event.revision);
                handler.handle(event, token).await;
                pending.remove_if(&key, |_, p| p.generation == generation);
            }
        });

        let entry = Pending {
            generation,
            token,
            running,
            handle,
        };
        if let Some(previous) = self.pending.insert(key.clone(), entry) {
            previous.supersede(&key);
        }
        let _ = start.send(());
    }

    /// Units with a run that has not finished yet.
    pub fn pending_units(&self) -> usize {
        self.pending.len()
    }

    /// Cancel everything, for shutdown.
    pub fn shutdown(&self) {
        let keys: Vec<UnitKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, pending)) = self.pending.remove(&key) {
                pending.supersede(&key);
            }
        }
    }
}
