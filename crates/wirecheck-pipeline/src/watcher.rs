//! Filesystem watcher that turns source edits into debounced re-maps

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wirecheck_core::RepoId;
use wirecheck_indexer::FileType;

use crate::pipeline::ChangeEvent;
use crate::scheduler::UpdateScheduler;

/// Revision label used for re-maps of an uncommitted working tree.
pub const WORKING_TREE: &str = "working-tree";

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File or directory created
    Created(PathBuf),
    /// File or directory modified
    Modified(PathBuf),
    /// File or directory removed
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => path,
        }
    }
}

/// File system watcher for a repository working tree
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    root_path: PathBuf,
}

impl FileWatcher {
    /// Create a watcher for `root_path`; call `start` to begin receiving events.
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().canonicalize()?;
        let ignores = load_gitignore(&root_path);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                Self::handle_notify_event(event, &ignores, &event_tx);
            }
            Err(e) => {
                error!("File system watch error: {}", e);
            }
        })?;

        Ok(Self {
            watcher,
            event_rx,
            root_path,
        })
    }

    /// Handle a notify event and convert to our watch events
    fn handle_notify_event(event: notify::Event, ignores: &Gitignore, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let wrap: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) => WatchEvent::Created,
            notify::EventKind::Modify(_) => WatchEvent::Modified,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if should_ignore_path(&path) || !is_source_file(&path) {
                continue;
            }
            if path.starts_with(ignores.path()) && ignores.matched_path_or_any_parents(&path, false).is_ignore() {
                continue;
            }
            if let Err(e) = event_tx.send(wrap(path)) {
                warn!("Failed to send watch event: {}", e);
            }
        }
    }

    /// Watch the root recursively
    pub fn start(&mut self) -> Result<()> {
        info!("Watching directory: {}", self.root_path.display());
        self.watcher.watch(&self.root_path, RecursiveMode::Recursive)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Next relevant change, or `None` once the watcher is gone.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }
}

fn load_gitignore(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(root.join(".gitignore")) {
        debug!("No usable .gitignore in {}: {}", root.display(), e);
    }
    builder.build().unwrap_or_else(|e| {
        warn!("Ignoring malformed .gitignore in {}: {}", root.display(), e);
        Gitignore::empty()
    })
}

/// Whether the parse capability would look at this file.
pub fn is_source_file(path: &Path) -> bool {
    FileType::from_path(path).is_some()
}

/// Vendored, generated and VCS directories never trigger a re-map.
pub fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component.as_os_str().to_str(),
            Some("node_modules" | ".git" | "dist" | "build" | "coverage" | ".wirecheck")
        )
    })
}

/// Feed every relevant change under `watcher`'s root to the scheduler as a
/// default-branch push of the working tree. Runs until the watcher stops.
pub async fn watch_repository(mut watcher: FileWatcher, repo: RepoId, scheduler: Arc<UpdateScheduler>) -> Result<()> {
    watcher.start()?;
    while let Some(event) = watcher.next_event().await {
        debug!("{} changed: {}", repo, event.path().display());
        scheduler.submit(ChangeEvent::push(repo.clone(), WORKING_TREE, WORKING_TREE));
    }
    info!("Stopped watching {}", watcher.root().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new(temp_dir.path());
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_relevant_paths() {
        assert!(is_source_file(Path::new("src/app.ts")));
        assert!(!is_source_file(Path::new("README.md")));
        assert!(!is_source_file(Path::new("types/env.d.ts")));
        assert!(should_ignore_path(Path::new("/repo/node_modules/x/index.js")));
        assert!(should_ignore_path(Path::new("/repo/.wirecheck/store/acme_widgets.json")));
        assert!(!should_ignore_path(Path::new("/repo/src/app.ts")));
    }

    #[test]
    fn test_gitignored_events_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".gitignore"), "generated/\n").unwrap();
        let ignores = load_gitignore(temp_dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let event = notify::Event::new(notify::EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(temp_dir.path().join("generated/client.ts"))
            .add_path(temp_dir.path().join("src/app.ts"))
            .add_path(temp_dir.path().join("notes.md"));
        FileWatcher::handle_notify_event(event, &ignores, &tx);

        assert_eq!(rx.try_recv().unwrap(), WatchEvent::Modified(temp_dir.path().join("src/app.ts")));
        assert!(rx.try_recv().is_err());
    }
}
