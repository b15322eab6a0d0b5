//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use wirecheck_core::{GraphReader, ReachabilityEngine, RepoId, Settings, SnapshotStore};
use wirecheck_indexer::Coordinator;
use wirecheck_pipeline::{
    AnalysisPipeline, CancellationToken, ChangeAction, ChangeEvent, Dispatcher, FileWatcher, GitSource, LocalSource,
    LogReporter, Remapper, UpdateScheduler, WORKING_TREE, reporter_from_settings, watch_repository,
};
use wirecheck_server::{ServerState, WirecheckServer};

pub fn load_settings(root: &Path) -> anyhow::Result<Settings> {
    Settings::load(root)
}

/// The configured store directory, relative paths taken from `root`.
fn open_store(root: &Path, settings: &Settings) -> anyhow::Result<Arc<SnapshotStore>> {
    let dir = if settings.store.dir.is_absolute() {
        settings.store.dir.clone()
    } else {
        root.join(&settings.store.dir)
    };
    Ok(Arc::new(SnapshotStore::open(dir)?))
}

pub async fn map(root: &Path, settings: &Settings, repo: &str, revision: &str) -> anyhow::Result<()> {
    let repo = RepoId::new(repo);
    tracing::info!("Mapping {} from {}", repo, root.display());

    let store = open_store(root, settings)?;
    let remapper = Remapper::new(
        store,
        Arc::new(LocalSource::single(repo.clone(), root)),
        Arc::new(Coordinator::new()),
        settings,
    );
    let summary = remapper.remap(&repo, revision).await?;

    tracing::info!(
        "Mapped {} files, {} functions, {} edges, {} entry points",
        summary.files,
        summary.functions,
        summary.edges,
        summary.entry_points
    );
    Ok(())
}

/// Runs the analysis and prints the report. Returns whether the verdict blocks.
pub async fn check(
    root: &Path,
    settings: &Settings,
    repo: &str,
    candidate: PathBuf,
    revision: &str,
) -> anyhow::Result<bool> {
    let repo = RepoId::new(repo);
    tracing::info!("Checking {} against the mapped default branch of {}", candidate.display(), repo);

    let store = open_store(root, settings)?;
    let pipeline = AnalysisPipeline::new(
        store,
        Arc::new(LocalSource::single(repo.clone(), candidate)),
        Arc::new(Coordinator::new()),
        Arc::new(LogReporter),
        settings,
    );
    let event = ChangeEvent {
        repo,
        revision: revision.to_string(),
        head_ref: revision.to_string(),
        base_ref: None,
        action: ChangeAction::Opened,
        pull_request: None,
    };
    let report = pipeline.run(&event, &CancellationToken::new()).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.is_blocking())
}

pub async fn unreachable(root: &Path, settings: &Settings, repo: &str, module: Option<&str>) -> anyhow::Result<()> {
    let repo = RepoId::new(repo);
    let store = open_store(root, settings)?;
    let engine = ReachabilityEngine::new(settings.analysis.max_hops);

    let reports = store.query_all_unreachable(&repo, module, &engine).await?;
    let total: usize = reports.iter().map(|r| r.functions.len()).sum();
    tracing::info!("{} unreachable exports in {} modules", total, reports.len());

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

pub async fn watch(root: PathBuf, settings: Settings, repo: &str) -> anyhow::Result<()> {
    let repo = RepoId::new(repo);
    let store = open_store(&root, &settings)?;
    let dispatcher = Dispatcher::assemble(
        store,
        Arc::new(LocalSource::single(repo.clone(), &root)),
        Arc::new(Coordinator::new()),
        Arc::new(LogReporter),
        &settings,
    );
    let scheduler = Arc::new(UpdateScheduler::new(Arc::new(dispatcher), settings.scheduler.debounce()));

    // Map once up front so queries work before the first edit.
    scheduler.submit(ChangeEvent::push(repo.clone(), WORKING_TREE, WORKING_TREE));

    let watcher = FileWatcher::new(&root)?;
    tokio::select! {
        result = watch_repository(watcher, repo, Arc::clone(&scheduler)) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, stopping watch"),
    }
    scheduler.shutdown();
    Ok(())
}

pub async fn serve(root: &Path, settings: Settings, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut server_settings = settings.server.clone();
    if let Some(host) = host {
        server_settings.host = host;
    }
    if let Some(port) = port {
        server_settings.port = port;
    }
    tracing::info!("Starting Wirecheck server on {}", server_settings.addr());

    let store = open_store(root, &settings)?;
    let dispatcher = Dispatcher::assemble(
        Arc::clone(&store),
        Arc::new(GitSource::new(settings.source.clone())),
        Arc::new(Coordinator::new()),
        reporter_from_settings(&settings.reporter),
        &settings,
    );
    let scheduler = Arc::new(UpdateScheduler::new(Arc::new(dispatcher), settings.scheduler.debounce()));

    let state = ServerState::new(store, Arc::clone(&scheduler), &settings);
    let server = WirecheckServer::new(state, server_settings);

    let result = server.start().await;
    scheduler.shutdown();
    result
}
