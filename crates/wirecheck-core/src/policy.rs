//! Per-repository policy: allowed orphans, custom entry points, file reclassification
//!
//! Policy is advisory. A missing or malformed document resolves to an empty
//! policy and never fails an analysis.

use std::path::Path;

use globset::{Glob, GlobMatcher};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classify::FileClassifier;
use crate::model::Function;

/// Raw YAML shape of the policy document.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyDocument {
    allowed_orphans: Vec<String>,
    entry_points: Vec<String>,
    not_test: Vec<String>,
    test: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy document is not valid YAML: {0}")]
    Syntax(#[from] serde_yaml::Error),
}

/// Matches a function name: exact, or a glob when the pattern contains wildcards.
#[derive(Debug, Clone)]
enum NameMatcher {
    Any,
    Exact(String),
    Glob(GlobMatcher),
}

impl NameMatcher {
    fn parse(pattern: &str) -> Option<Self> {
        if pattern == "*" {
            return Some(NameMatcher::Any);
        }
        if pattern.contains(['*', '?', '[']) {
            return Glob::new(pattern).ok().map(|g| NameMatcher::Glob(g.compile_matcher()));
        }
        Some(NameMatcher::Exact(pattern.to_string()))
    }

    fn matches(&self, function: &Function) -> bool {
        match self {
            NameMatcher::Any => true,
            NameMatcher::Exact(name) => function.name == *name || function.qualified_name == *name,
            NameMatcher::Glob(glob) => glob.is_match(&function.name) || glob.is_match(&function.qualified_name),
        }
    }
}

/// One `allowed_orphans` or `entry_points` rule: a file pattern and a function pattern.
#[derive(Debug, Clone)]
pub struct FunctionRule {
    source: String,
    file: GlobMatcher,
    function: NameMatcher,
}

impl FunctionRule {
    /// Parse `file:function`, `file:*`, or a bare file glob (meaning every function).
    fn parse(raw: &str, require_function: bool) -> Option<Self> {
        let trimmed = raw.trim();
        let (file_pattern, function_pattern) = match trimmed.rsplit_once(':') {
            Some((file, function)) if !file.is_empty() && !function.is_empty() => (file, function),
            _ if require_function => return None,
            _ => (trimmed, "*"),
        };
        let file_pattern = file_pattern.trim_start_matches("./");
        let file = Glob::new(file_pattern).ok()?.compile_matcher();
        let function = NameMatcher::parse(function_pattern)?;
        Some(FunctionRule {
            source: trimmed.to_string(),
            file,
            function,
        })
    }

    pub fn matches(&self, function: &Function) -> bool {
        self.file.is_match(&function.file) && self.function.matches(function)
    }

    /// The rule as written in the policy document.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Resolved policy for one analysis.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    allowed_orphans: Vec<FunctionRule>,
    entry_points: Vec<FunctionRule>,
    not_test: Vec<String>,
    test: Vec<String>,
}

impl Policy {
    pub fn empty() -> Self {
        Policy::default()
    }

    /// Strict parse. Invalid individual patterns are skipped with a warning.
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        if text.trim().is_empty() {
            return Ok(Policy::empty());
        }
        let doc: PolicyDocument = serde_yaml::from_str(text)?;

        let allowed_orphans = doc
            .allowed_orphans
            .iter()
            .filter_map(|raw| {
                let rule = FunctionRule::parse(raw, false);
                if rule.is_none() {
                    warn!("Ignoring invalid allowed_orphans pattern '{}'", raw);
                }
                rule
            })
            .collect();

        let entry_points = doc
            .entry_points
            .iter()
            .filter_map(|raw| {
                let rule = FunctionRule::parse(raw, true);
                if rule.is_none() {
                    warn!("Ignoring invalid entry_points pattern '{}' (expected pattern:function)", raw);
                }
                rule
            })
            .collect();

        Ok(Policy {
            allowed_orphans,
            entry_points,
            not_test: doc.not_test,
            test: doc.test,
        })
    }

    /// Lenient parse: malformed documents degrade to the empty policy.
    pub fn parse_lenient(text: &str) -> Self {
        Policy::parse(text).unwrap_or_else(|e| {
            warn!("Malformed policy document, continuing without rules: {}", e);
            Policy::empty()
        })
    }

    /// Load the policy document at `path`. Absence is valid.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Policy::parse_lenient(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No policy document at {}", path.display());
                Policy::empty()
            }
            Err(e) => {
                warn!("Cannot read policy document {}: {}", path.display(), e);
                Policy::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed_orphans.is_empty()
            && self.entry_points.is_empty()
            && self.not_test.is_empty()
            && self.test.is_empty()
    }

    /// The first `allowed_orphans` rule matching the function, if any.
    pub fn allowed_orphan(&self, function: &Function) -> Option<&FunctionRule> {
        self.allowed_orphans.iter().find(|rule| rule.matches(function))
    }

    /// Whether the policy declares this function an entry point.
    pub fn is_custom_entry_point(&self, function: &Function) -> bool {
        self.entry_points.iter().any(|rule| rule.matches(function))
    }

    pub fn entry_point_rules(&self) -> &[FunctionRule] {
        &self.entry_points
    }

    /// File classifier with this policy's reclassification overrides applied.
    pub fn classifier(&self) -> FileClassifier {
        FileClassifier::new(&self.not_test, &self.test)
    }
}
