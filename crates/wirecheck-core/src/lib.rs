//! Wirecheck Core: call-graph model, reachability engine, policy and classification

pub mod model;
pub mod error;
pub mod classify;
pub mod policy;
pub mod graph;
pub mod reachability;
pub mod corroborate;
pub mod classifier;
pub mod store;
pub mod config;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use model::{
    CallEdge, EntryPoint, EntryPointKind, EventEmit, EventPattern, Function, FunctionId, FunctionKey, ImportEdge,
    Language, ParseRepository, ParsedRepository, RepoId, RepositoryModel, SourceFile, MODULE_SCOPE,
};
pub use error::{GraphError, StoreError};
pub use classify::{is_test, FileClassifier};
pub use policy::{FunctionRule, Policy, PolicyError};
pub use graph::{EdgeKind, EntrySource, RepoGraph, ResolvedEntryPoint};
pub use reachability::{CallerRef, ModuleReport, ReachabilityEngine, ReachabilityStatus, UnreachableExport};
pub use corroborate::{Corroboration, ReferenceCorroborator, SourceSet};
pub use classifier::{classify, merge, Disposition, MergeRule, Tier, MERGE_TABLE};
pub use store::{EntryPointInfo, GraphReader, GraphStore, RepoSnapshot, ReplaceSummary, SnapshotStore};
pub use config::Settings;
