//! Error types shared across the workspace

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{FunctionId, RepoId};

/// Consistency failures found while building a repository graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("function {name} references unknown file {file}")]
    UnknownFile { name: String, file: PathBuf },

    #[error("duplicate function id {0}")]
    DuplicateFunction(FunctionId),

    #[error("call edge {caller} -> {callee} references an unknown function")]
    DanglingCall { caller: FunctionId, callee: FunctionId },

    #[error("emit of '{event}' references unknown function {emitter}")]
    DanglingEmit { event: String, emitter: FunctionId },
}

/// Failures of the call-graph store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("repository {0} has not been mapped")]
    NotMapped(RepoId),

    #[error("inconsistent subgraph for {repo}: {source}")]
    Inconsistent {
        repo: RepoId,
        #[source]
        source: GraphError,
    },

    #[error("snapshot persistence failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
