//! Bounded-depth reachability from production entry points

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{GraphNode, RepoGraph};
use crate::model::FunctionId;

/// Default traversal bound, in edges.
pub const DEFAULT_MAX_HOPS: usize = 10;

/// Graph-only verdict for one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachabilityStatus {
    /// The function is itself a registered production entry point.
    EntryPoint,
    /// A production-only path of at most `max_hops` edges leads here from an entry point.
    Reachable,
    /// Defined in a test file, or only reached from test code.
    TestOnly,
    Unreachable,
}

impl ReachabilityStatus {
    pub fn is_reachable(self) -> bool {
        matches!(self, ReachabilityStatus::EntryPoint | ReachabilityStatus::Reachable)
    }
}

/// A caller found for an unreachable export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRef {
    pub function: FunctionId,
    pub qualified_name: String,
    pub file: PathBuf,
    pub is_test: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreachableExport {
    pub function: FunctionId,
    pub qualified_name: String,
    pub line: u32,
    pub status: ReachabilityStatus,
    pub callers: Vec<CallerRef>,
}

/// Unreachable exports of one module (defining file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: PathBuf,
    pub functions: Vec<UnreachableExport>,
}

/// Traversal engine. Stateless apart from its hop bound.
#[derive(Debug, Clone, Copy)]
pub struct ReachabilityEngine {
    max_hops: usize,
}

impl Default for ReachabilityEngine {
    fn default() -> Self {
        ReachabilityEngine::new(DEFAULT_MAX_HOPS)
    }
}

impl ReachabilityEngine {
    pub fn new(max_hops: usize) -> Self {
        ReachabilityEngine { max_hops }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Functions reachable from any production entry point within the hop bound,
    /// stepping only through production functions.
    pub fn reachable_set(&self, graph: &RepoGraph) -> HashSet<FunctionId> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();

        for entry in graph.entry_points() {
            if graph.is_test_function(entry.function) {
                continue;
            }
            if let Some(idx) = graph.node_index(entry.function) {
                if visited.insert(idx) {
                    queue.push_back((idx, 0));
                }
            }
        }

        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= self.max_hops {
                continue;
            }
            for (next, _) in graph.neighbors(idx, Direction::Outgoing) {
                let allowed = match graph.node(next) {
                    Some(GraphNode::Function(id)) => !graph.is_test_function(*id),
                    Some(GraphNode::Event { .. }) => true,
                    None => false,
                };
                if allowed && visited.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }

        visited
            .into_iter()
            .filter_map(|idx| match graph.node(idx) {
                Some(GraphNode::Function(id)) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Status of each requested function. Unknown ids are left out of the result.
    pub fn classify(&self, graph: &RepoGraph, targets: &[FunctionId]) -> BTreeMap<FunctionId, ReachabilityStatus> {
        let reached = self.reachable_set(graph);
        targets
            .iter()
            .filter_map(|&id| {
                if graph.function(id).is_none() {
                    debug!("Reachability requested for unknown function {}", id);
                    return None;
                }
                Some((id, self.status_with(graph, &reached, id)))
            })
            .collect()
    }

    fn status_with(&self, graph: &RepoGraph, reached: &HashSet<FunctionId>, id: FunctionId) -> ReachabilityStatus {
        if graph.is_test_function(id) {
            return ReachabilityStatus::TestOnly;
        }
        if graph.is_entry_point(id) {
            return ReachabilityStatus::EntryPoint;
        }
        if reached.contains(&id) {
            return ReachabilityStatus::Reachable;
        }
        if self.reached_from_tests(graph, id) {
            return ReachabilityStatus::TestOnly;
        }
        ReachabilityStatus::Unreachable
    }

    /// Reverse search: does any test function lead to `id` within the hop bound?
    fn reached_from_tests(&self, graph: &RepoGraph, id: FunctionId) -> bool {
        let Some(start) = graph.node_index(id) else {
            return false;
        };
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= self.max_hops {
                continue;
            }
            for (prev, _) in graph.neighbors(idx, Direction::Incoming) {
                if !visited.insert(prev) {
                    continue;
                }
                if let Some(GraphNode::Function(caller)) = graph.node(prev) {
                    if graph.is_test_function(*caller) {
                        return true;
                    }
                }
                queue.push_back((prev, depth + 1));
            }
        }
        false
    }

    /// Every exported production function not reachable from an entry point,
    /// grouped by defining file and annotated with the callers that do exist.
    pub fn unreachable_exports(&self, graph: &RepoGraph, module_filter: Option<&str>) -> Vec<ModuleReport> {
        let reached = self.reachable_set(graph);
        let mut modules: BTreeMap<PathBuf, Vec<UnreachableExport>> = BTreeMap::new();

        for function in graph.production_exports() {
            if let Some(prefix) = module_filter {
                if !function.file.starts_with(prefix) && !function.file.to_string_lossy().starts_with(prefix) {
                    continue;
                }
            }
            let status = self.status_with(graph, &reached, function.id);
            if status.is_reachable() {
                continue;
            }
            let callers = graph
                .callers(function.id)
                .into_iter()
                .filter_map(|caller| graph.function(caller))
                .map(|caller| CallerRef {
                    function: caller.id,
                    qualified_name: caller.qualified_name.clone(),
                    file: caller.file.clone(),
                    is_test: graph.is_test_file(&caller.file),
                })
                .collect();
            modules.entry(function.file.clone()).or_default().push(UnreachableExport {
                function: function.id,
                qualified_name: function.qualified_name.clone(),
                line: function.line_start,
                status,
                callers,
            });
        }

        modules
            .into_iter()
            .map(|(module, mut functions)| {
                functions.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.qualified_name.cmp(&b.qualified_name)));
                ModuleReport { module, functions }
            })
            .collect()
    }
}
