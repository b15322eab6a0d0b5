//! Revision sources: where a repository's working tree for one revision comes from

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use wirecheck_core::RepoId;
use wirecheck_core::config::SourceSettings;

use crate::error::SourceError;

/// A working tree for one revision. Temporary trees are deleted on drop.
#[derive(Debug)]
pub struct Checkout {
    root: PathBuf,
    revision: String,
    workdir: Option<TempDir>,
}

impl Checkout {
    /// A tree owned by someone else; nothing is removed on drop.
    pub fn borrowed(root: impl Into<PathBuf>, revision: impl Into<String>) -> Self {
        Checkout {
            root: root.into(),
            revision: revision.into(),
            workdir: None,
        }
    }

    fn temporary(workdir: TempDir, revision: &str) -> Self {
        Checkout {
            root: workdir.path().to_path_buf(),
            revision: revision.to_string(),
            workdir: Some(workdir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Text of the policy document at `relative`, if the tree has one.
    /// Unreadable documents are treated as absent.
    pub async fn read_policy(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No policy document at {}", path.display());
                None
            }
            Err(e) => {
                warn!("Cannot read policy document {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if self.workdir.is_some() {
            debug!("Releasing checkout of {} at {}", self.revision, self.root.display());
        }
    }
}

#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn checkout(&self, repo: &RepoId, revision: &str) -> Result<Checkout, SourceError>;
}

/// Shallow-fetches single revisions with the `git` binary.
#[derive(Debug, Clone)]
pub struct GitSource {
    settings: SourceSettings,
    git: PathBuf,
}

impl GitSource {
    pub fn new(settings: SourceSettings) -> Self {
        GitSource {
            settings,
            git: PathBuf::from("git"),
        }
    }

    async fn git(&self, repo: &RepoId, dir: &Path, args: &[&str]) -> Result<(), SourceError> {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(SourceError::Git {
            repo: repo.clone(),
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl RevisionSource for GitSource {
    async fn checkout(&self, repo: &RepoId, revision: &str) -> Result<Checkout, SourceError> {
        let remote = self.settings.remote_for(repo.as_str());
        let workdir = TempDir::new()?;
        let dir = workdir.path();
        debug!("Fetching {} at {} into {}", repo, revision, dir.display());

        self.git(repo, dir, &["init", "--quiet"]).await?;
        self.git(repo, dir, &["fetch", "--quiet", "--depth", "1", &remote, revision])
            .await?;
        self.git(repo, dir, &["checkout", "--quiet", "--detach", "FETCH_HEAD"])
            .await?;

        info!("Checked out {} at {}", repo, revision);
        Ok(Checkout::temporary(workdir, revision))
    }
}

/// Fixed working trees per repository, for local runs and watch mode.
#[derive(Debug, Clone, Default)]
pub struct LocalSource {
    roots: HashMap<RepoId, PathBuf>,
}

impl LocalSource {
    pub fn new() -> Self {
        LocalSource::default()
    }

    pub fn single(repo: RepoId, root: impl Into<PathBuf>) -> Self {
        LocalSource::new().with_repo(repo, root)
    }

    pub fn with_repo(mut self, repo: RepoId, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(repo, root.into());
        self
    }
}

#[async_trait]
impl RevisionSource for LocalSource {
    async fn checkout(&self, repo: &RepoId, revision: &str) -> Result<Checkout, SourceError> {
        let root = self
            .roots
            .get(repo)
            .ok_or_else(|| SourceError::UnknownRepository(repo.clone()))?;
        if !tokio::fs::metadata(root).await.is_ok_and(|m| m.is_dir()) {
            return Err(SourceError::MissingDirectory(root.clone()));
        }
        Ok(Checkout::borrowed(root.clone(), revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecheck_core::test_utils::write_repo;

    #[tokio::test]
    async fn test_local_source() {
        let repo = RepoId::new("acme/widgets");
        let dir = write_repo(&[(".wirecheck.yml", "allowed_orphans: []\n")]);
        let source = LocalSource::single(repo.clone(), dir.path());

        let checkout = source.checkout(&repo, "working-tree").await.unwrap();
        assert_eq!(checkout.path(), dir.path());
        assert_eq!(checkout.revision(), "working-tree");
        assert!(checkout.read_policy(".wirecheck.yml").await.is_some());
        assert!(checkout.read_policy("missing.yml").await.is_none());
        drop(checkout);
        assert!(dir.path().exists());

        let err = source.checkout(&RepoId::new("acme/other"), "x").await.unwrap_err();
        assert!(matches!(err, SourceError::UnknownRepository(_)));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let repo = RepoId::new("acme/widgets");
        let source = LocalSource::single(repo.clone(), "/nonexistent/wirecheck/tree");
        let err = source.checkout(&repo, "x").await.unwrap_err();
        assert!(matches!(err, SourceError::MissingDirectory(_)));
    }

    #[test]
    fn test_temporary_checkout_is_removed_on_drop() {
        let workdir = TempDir::new().unwrap();
        let path = workdir.path().to_path_buf();
        let checkout = Checkout::temporary(workdir, "abc123");
        assert!(path.exists());
        drop(checkout);
        assert!(!path.exists());
    }
}
