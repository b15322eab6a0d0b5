//! Error types for re-maps, change analysis and verdict publishing

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use wirecheck_core::{GraphError, RepoId, StoreError};

/// Errors that can tell whether trying again may help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Fetching a revision into a working tree failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to prepare checkout: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed for {repo}: {stderr}")]
    Git {
        repo: RepoId,
        command: String,
        stderr: String,
    },

    #[error("no working tree configured for {0}")]
    UnknownRepository(RepoId),

    #[error("{0} is not a directory")]
    MissingDirectory(PathBuf),
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, SourceError::Io(_) | SourceError::Git { .. })
    }
}

/// Publishing a verdict failed.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reporter rejected verdict with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl Transient for ReportError {
    fn is_transient(&self) -> bool {
        match self {
            ReportError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ReportError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Anything that stops a re-map or a change analysis before it completes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("candidate graph is inconsistent: {0}")]
    Graph(#[from] GraphError),

    #[error("parse failed: {0:#}")]
    Parse(anyhow::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl Transient for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            PipelineError::Source(e) => e.is_transient(),
            PipelineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let git = SourceError::Git {
            repo: RepoId::new("acme/widgets"),
            command: "fetch".to_string(),
            stderr: "connection reset".to_string(),
        };
        assert!(git.is_transient());
        assert!(!SourceError::UnknownRepository(RepoId::new("acme/widgets")).is_transient());

        assert!(PipelineError::from(StoreError::Unavailable("down".to_string())).is_transient());
        assert!(!PipelineError::from(StoreError::NotMapped(RepoId::new("acme/widgets"))).is_transient());
        assert!(!PipelineError::Timeout(Duration::from_secs(1)).is_transient());

        let rejected = |status| ReportError::Rejected {
            status,
            body: String::new(),
        };
        assert!(rejected(503).is_transient());
        assert!(rejected(429).is_transient());
        assert!(!rejected(422).is_transient());
    }
}
