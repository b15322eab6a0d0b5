//! Repository call graph using petgraph::StableDiGraph
//!
//! Nodes are functions and event bindings. Edges are static calls plus the
//! event-bus relations `emitter -EmitsEvent-> binding -HandlesEvent-> handler`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::FileClassifier;
use crate::error::GraphError;
use crate::model::*;
use crate::policy::Policy;

/// Relation carried by a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    EmitsEvent,
    HandlesEvent,
}

/// A node of the repository graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Function(FunctionId),
    Event { event: String, pattern: EventPattern },
}

/// Why a function is treated as an entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EntrySource {
    Registration { kind: EntryPointKind, file: PathBuf },
    Policy { rule: String },
    Baseline { kind: String },
}

/// An entry point whose handler resolved to a function of this graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntryPoint {
    pub function: FunctionId,
    pub source: EntrySource,
}

/// The call graph of one repository revision.
pub struct RepoGraph {
    inner: StableDiGraph<GraphNode, EdgeKind>,
    function_index: HashMap<FunctionId, NodeIndex>,
    event_index: HashMap<(String, EventPattern), NodeIndex>,
    functions: HashMap<FunctionId, Function>,
    files: BTreeMap<PathBuf, SourceFile>,
    by_key: HashMap<FunctionKey, FunctionId>,
    entry_points: Vec<ResolvedEntryPoint>,
    entry_set: HashSet<FunctionId>,
    model: RepositoryModel,
}

impl std::fmt::Debug for RepoGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoGraph")
            .field("file_count", &self.files.len())
            .field("function_count", &self.functions.len())
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("entry_point_count", &self.entry_points.len())
            .finish()
    }
}

impl RepoGraph {
    /// Build a graph from a repository model with the default path heuristic.
    pub fn build(model: RepositoryModel) -> Result<Self, GraphError> {
        Self::build_with_policy(model, &Policy::empty())
    }

    /// Build a graph, recomputing every file's `is_test` with the policy's
    /// overrides and adding the policy's custom entry points.
    ///
    /// Fails on structural inconsistency; nothing is partially built.
    pub fn build_with_policy(mut model: RepositoryModel, policy: &Policy) -> Result<Self, GraphError> {
        let classifier = policy.classifier();
        reclassify(&mut model, &classifier);

        let files: BTreeMap<PathBuf, SourceFile> =
            model.files.iter().map(|f| (f.path.clone(), f.clone())).collect();

        let mut inner = StableDiGraph::new();
        let mut function_index = HashMap::new();
        let mut functions = HashMap::new();
        let mut by_key = HashMap::new();

        for function in &model.functions {
            if !files.contains_key(&function.file) {
                return Err(GraphError::UnknownFile {
                    name: function.qualified_name.clone(),
                    file: function.file.clone(),
                });
            }
            if functions.contains_key(&function.id) {
                return Err(GraphError::DuplicateFunction(function.id));
            }
            let idx = inner.add_node(GraphNode::Function(function.id));
            function_index.insert(function.id, idx);
            by_key.insert(function.key(), function.id);
            functions.insert(function.id, function.clone());
        }

        for edge in &model.call_edges {
            let (Some(&source), Some(&target)) =
                (function_index.get(&edge.caller), function_index.get(&edge.callee))
            else {
                return Err(GraphError::DanglingCall {
                    caller: edge.caller,
                    callee: edge.callee,
                });
            };
            inner.add_edge(source, target, EdgeKind::Calls);
        }

        let mut graph = RepoGraph {
            inner,
            function_index,
            event_index: HashMap::new(),
            functions,
            files,
            by_key,
            entry_points: Vec::new(),
            entry_set: HashSet::new(),
            model: RepositoryModel::default(),
        };

        for emit in &model.emits {
            let Some(&emitter) = graph.function_index.get(&emit.emitter) else {
                return Err(GraphError::DanglingEmit {
                    event: emit.event.clone(),
                    emitter: emit.emitter,
                });
            };
            let event = graph.event_node(&emit.event, EventPattern::Emitter);
            graph.inner.add_edge(emitter, event, EdgeKind::EmitsEvent);
        }

        graph.register_entry_points(&model.entry_points);
        graph.register_policy_entry_points(policy);
        graph.model = model;

        debug!("Built {:?}", graph);
        Ok(graph)
    }

    fn event_node(&mut self, event: &str, pattern: EventPattern) -> NodeIndex {
        let key = (event.to_string(), pattern);
        if let Some(&idx) = self.event_index.get(&key) {
            return idx;
        }
        let idx = self.inner.add_node(GraphNode::Event {
            event: event.to_string(),
            pattern,
        });
        self.event_index.insert(key, idx);
        idx
    }

    /// Entry points registered in test files never count; unresolved handlers
    /// are logged and excluded.
    fn register_entry_points(&mut self, entry_points: &[EntryPoint]) {
        for entry in entry_points {
            if self.is_test_file(&entry.file) {
                continue;
            }
            let Some(handler) = entry.handler.filter(|id| self.functions.contains_key(id)) else {
                warn!(
                    "Entry point {} in {} names unknown handler '{}', excluding it",
                    entry.kind,
                    entry.file.display(),
                    entry.handler_name
                );
                continue;
            };

            if let EntryPointKind::EventBinding { event, pattern } = &entry.kind {
                let event_idx = self.event_node(event, *pattern);
                if let Some(&handler_idx) = self.function_index.get(&handler) {
                    self.inner.add_edge(event_idx, handler_idx, EdgeKind::HandlesEvent);
                }
            }

            self.add_entry_point(ResolvedEntryPoint {
                function: handler,
                source: EntrySource::Registration {
                    kind: entry.kind.clone(),
                    file: entry.file.clone(),
                },
            });
        }
    }

    fn register_policy_entry_points(&mut self, policy: &Policy) {
        for rule in policy.entry_point_rules() {
            let mut matched: Vec<FunctionId> = self
                .functions
                .values()
                .filter(|f| rule.matches(f))
                .map(|f| f.id)
                .collect();
            matched.sort();
            if matched.is_empty() {
                debug!("Policy entry point '{}' matched no function", rule.as_str());
            }
            for function in matched {
                self.add_entry_point(ResolvedEntryPoint {
                    function,
                    source: EntrySource::Policy {
                        rule: rule.as_str().to_string(),
                    },
                });
            }
        }
    }

    pub fn add_entry_point(&mut self, entry: ResolvedEntryPoint) {
        self.entry_set.insert(entry.function);
        self.entry_points.push(entry);
    }

    /// Carry entry points of another graph (the persisted main-branch graph)
    /// over to functions with the same identity in this one.
    pub fn adopt_entry_points(&mut self, baseline: &RepoGraph) -> usize {
        let mut adopted = 0;
        for entry in baseline.entry_points() {
            let Some(function) = baseline.function(entry.function) else {
                continue;
            };
            let Some(local) = self.by_key.get(&function.key()).copied() else {
                continue;
            };
            if self.is_test_function(local) || self.entry_set.contains(&local) {
                continue;
            }
            let kind = match &entry.source {
                EntrySource::Registration { kind, .. } => kind.to_string(),
                EntrySource::Policy { rule } => format!("policy({rule})"),
                EntrySource::Baseline { kind } => kind.clone(),
            };
            self.add_entry_point(ResolvedEntryPoint {
                function: local,
                source: EntrySource::Baseline { kind },
            });
            adopted += 1;
        }
        adopted
    }

    /// Get a function by ID.
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(&id)
    }

    pub fn function_by_key(&self, key: &FunctionKey) -> Option<&Function> {
        self.by_key.get(key).and_then(|id| self.functions.get(id))
    }

    /// Iterate over all functions.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn is_test_file(&self, path: &Path) -> bool {
        self.files.get(path).is_some_and(|f| f.is_test)
    }

    pub fn is_test_function(&self, id: FunctionId) -> bool {
        self.functions
            .get(&id)
            .is_some_and(|f| self.is_test_file(&f.file))
    }

    pub fn entry_points(&self) -> &[ResolvedEntryPoint] {
        &self.entry_points
    }

    pub fn is_entry_point(&self, id: FunctionId) -> bool {
        self.entry_set.contains(&id)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of graph edges (calls plus event relations).
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// The model this graph was built from, with `is_test` recomputed.
    pub fn model(&self) -> &RepositoryModel {
        &self.model
    }

    pub(crate) fn node_index(&self, id: FunctionId) -> Option<NodeIndex> {
        self.function_index.get(&id).copied()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> Option<&GraphNode> {
        self.inner.node_weight(idx)
    }

    /// Neighbours in the given direction, with the connecting edge kind.
    pub(crate) fn neighbors(
        &self,
        idx: NodeIndex,
        direction: Direction,
    ) -> impl Iterator<Item = (NodeIndex, EdgeKind)> + '_ {
        self.inner.edges_directed(idx, direction).map(move |edge| {
            let other = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            (other, *edge.weight())
        })
    }

    /// Direct callers of a function through `Calls` edges.
    pub fn callers(&self, id: FunctionId) -> Vec<FunctionId> {
        let Some(idx) = self.node_index(id) else {
            return Vec::new();
        };
        let mut callers: Vec<FunctionId> = self
            .neighbors(idx, Direction::Incoming)
            .filter(|(_, kind)| *kind == EdgeKind::Calls)
            .filter_map(|(other, _)| match self.node(other) {
                Some(GraphNode::Function(caller)) => Some(*caller),
                _ => None,
            })
            .collect();
        callers.sort();
        callers.dedup();
        callers
    }

    /// Exported functions of production files, excluding module scopes.
    pub fn production_exports(&self) -> impl Iterator<Item = &Function> {
        self.functions
            .values()
            .filter(move |f| f.is_exported && !f.is_module_scope() && !self.is_test_file(&f.file))
    }
}

fn reclassify(model: &mut RepositoryModel, classifier: &FileClassifier) {
    for file in &mut model.files {
        file.is_test = classifier.is_test(&file.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ModelBuilder;

    #[test]
    fn test_build_counts() {
        let mut b = ModelBuilder::new();
        let a = b.export("src/a.ts", "a");
        let c = b.export("src/a.ts", "c");
        b.call(a, c);
        b.endpoint("src/a.ts", "GET", "/a", a);
        let graph = RepoGraph::build(b.build()).unwrap();

        assert_eq!(graph.function_count(), 2);
        assert_eq!(graph.file_count(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.is_entry_point(a));
        assert_eq!(graph.callers(c), vec![a]);
    }

    #[test]
    fn test_unknown_file_rejected() {
        let mut b = ModelBuilder::new();
        b.export("src/a.ts", "a");
        let mut model = b.build();
        model.files.clear();
        assert!(matches!(RepoGraph::build(model), Err(GraphError::UnknownFile { .. })));
    }

    #[test]
    fn test_dangling_call_rejected() {
        let mut b = ModelBuilder::new();
        let a = b.export("src/a.ts", "a");
        b.call(a, FunctionId(42));
        assert!(matches!(RepoGraph::build(b.build()), Err(GraphError::DanglingCall { .. })));
    }

    #[test]
    fn test_unresolved_handler_excluded() {
        let mut b = ModelBuilder::new();
        b.export("src/a.ts", "a");
        b.unresolved_endpoint("src/a.ts", "POST", "/ghost", "ghostHandler");
        let graph = RepoGraph::build(b.build()).unwrap();
        assert!(graph.entry_points().is_empty());
    }

    #[test]
    fn test_entry_points_in_test_files_ignored() {
        let mut b = ModelBuilder::new();
        let h = b.export("src/handlers.ts", "handler");
        b.endpoint("src/app.test.ts", "GET", "/x", h);
        let graph = RepoGraph::build(b.build()).unwrap();
        assert!(!graph.is_entry_point(h));
    }

    #[test]
    fn test_is_test_recomputed_on_build() {
        let mut b = ModelBuilder::new();
        b.export("src/__tests__/helpers.ts", "helper");
        let mut model = b.build();
        model.files[0].is_test = false;
        let graph = RepoGraph::build(model).unwrap();
        assert!(graph.is_test_file(Path::new("src/__tests__/helpers.ts")));
    }

    #[test]
    fn test_policy_entry_points() {
        let mut b = ModelBuilder::new();
        let run = b.export("src/jobs/nightly.ts", "run");
        let policy = Policy::parse("entry_points:\n  - \"src/jobs/*.ts:run\"\n").unwrap();
        let graph = RepoGraph::build_with_policy(b.build(), &policy).unwrap();
        assert!(graph.is_entry_point(run));
    }

    #[test]
    fn test_adopt_entry_points_by_identity() {
        let mut base = ModelBuilder::new();
        let handler = base.export("src/handlers.ts", "createWidget");
        base.endpoint("src/app.ts", "POST", "/widgets", handler);
        let baseline = RepoGraph::build(base.build()).unwrap();

        let mut cand = ModelBuilder::new();
        let handler2 = cand.export("src/handlers.ts", "createWidget");
        let mut candidate = RepoGraph::build(cand.build()).unwrap();
        assert!(!candidate.is_entry_point(handler2));

        assert_eq!(candidate.adopt_entry_points(&baseline), 1);
        assert!(candidate.is_entry_point(handler2));
        assert_eq!(candidate.adopt_entry_points(&baseline), 0);
    }
}
