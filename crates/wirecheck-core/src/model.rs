//! Core data structures for the call-graph model

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::xxh3_64;

/// Qualified name of the pseudo-function that owns a file's top-level code.
pub const MODULE_SCOPE: &str = "<module>";

/// Repository identifier, usually `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(id: impl Into<String>) -> Self {
        RepoId(id.into())
    }

    pub fn from_parts(owner: &str, name: &str) -> Self {
        RepoId(format!("{owner}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe form, used for snapshot file names. Every byte outside
    /// `[A-Za-z0-9_-]` is percent-escaped, so distinct ids never share a slug.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                slug.push(char::from(byte));
            } else {
                let _ = write!(slug, "%{byte:02X}");
            }
        }
        slug
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier for a function, derived from its defining file and qualified name.
/// Serialized as 16 hex digits so JSON clients never round it through a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FunctionId(pub u64);

impl FunctionId {
    pub fn new(file: &Path, qualified_name: &str) -> Self {
        let key = format!("{}\0{}", file.to_string_lossy(), qualified_name);
        FunctionId(xxh3_64(key.as_bytes()))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for FunctionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(FunctionId)
    }
}

impl Serialize for FunctionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FunctionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a function that survives re-parsing: defining file plus qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionKey {
    pub file: PathBuf,
    pub qualified_name: String,
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.qualified_name)
    }
}

/// Source languages understood by the parse capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            _ => Language::Other,
        }
    }
}

/// A source file of the mapped repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path, `/`-separated.
    pub path: PathBuf,
    pub language: Language,
    pub loc: u32,
    /// Derived from the path on every graph build, never set by hand.
    pub is_test: bool,
    pub is_active: bool,
}

/// A function (or method, or pseudo-function) defined in exactly one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub qualified_name: String,
    pub file: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
    pub is_exported: bool,
    pub is_async: bool,
    /// Cyclomatic complexity (1 for straight-line code).
    pub complexity: u32,
}

impl Function {
    pub fn key(&self) -> FunctionKey {
        FunctionKey {
            file: self.file.clone(),
            qualified_name: self.qualified_name.clone(),
        }
    }

    pub fn is_module_scope(&self) -> bool {
        self.qualified_name == MODULE_SCOPE
    }
}

/// Statically observed invocation `caller -> callee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: FunctionId,
    pub callee: FunctionId,
    pub line: Option<u32>,
}

/// File-level import. Type-only imports never establish runtime reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub names: Vec<String>,
    pub type_only: bool,
}

/// How an event handler was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPattern {
    /// `on` / `once` / `addListener`, paired with `emit` elsewhere.
    Emitter,
    /// `use`, with an optional mount path.
    Middleware,
}

/// What the hosting environment binds a handler to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryPointKind {
    Endpoint { method: String, route: String },
    CronJob { schedule: String },
    EventBinding { event: String, pattern: EventPattern },
}

impl fmt::Display for EntryPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPointKind::Endpoint { method, route } => write!(f, "{method} {route}"),
            EntryPointKind::CronJob { schedule } => write!(f, "cron({schedule})"),
            EntryPointKind::EventBinding { event, pattern } => match pattern {
                EventPattern::Emitter => write!(f, "on({event})"),
                EventPattern::Middleware => write!(f, "use({event})"),
            },
        }
    }
}

/// An entry-point registration. `handler` is `None` when the parser could not
/// resolve `handler_name` to a known function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub kind: EntryPointKind,
    pub handler: Option<FunctionId>,
    pub handler_name: String,
    /// File containing the registration.
    pub file: PathBuf,
    pub registered_by: Option<FunctionId>,
    pub line: Option<u32>,
}

/// An `emit('event')` call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEmit {
    pub emitter: FunctionId,
    pub event: String,
    pub line: Option<u32>,
}

/// Everything the parse capability knows about one revision of a repository.
/// This is also the persisted form of a repository's subgraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryModel {
    pub files: Vec<SourceFile>,
    pub functions: Vec<Function>,
    pub call_edges: Vec<CallEdge>,
    pub import_edges: Vec<ImportEdge>,
    pub entry_points: Vec<EntryPoint>,
    pub emits: Vec<EventEmit>,
}

/// Parse output: the model plus the raw source text, kept for textual corroboration.
#[derive(Debug, Clone, Default)]
pub struct ParsedRepository {
    pub model: RepositoryModel,
    pub sources: BTreeMap<PathBuf, String>,
}

/// The parse capability consumed by the re-map and change-analysis paths.
pub trait ParseRepository: Send + Sync {
    fn parse(&self, root: &Path) -> anyhow::Result<ParsedRepository>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_do_not_collide() {
        let a = RepoId::new("acme/a_b");
        let b = RepoId::new("acme_a/b");
        assert_eq!(a.slug(), "acme%2Fa_b");
        assert_eq!(b.slug(), "acme_a%2Fb");
        assert_ne!(RepoId::new("acme/x%2Fy").slug(), RepoId::new("acme/x/y").slug());
    }

    #[test]
    fn test_function_id_is_stable_hex() {
        let id = FunctionId::new(Path::new("src/pricing.ts"), "computeDiscount");
        assert_eq!(id, FunctionId::new(Path::new("src/pricing.ts"), "computeDiscount"));
        assert_ne!(id, FunctionId::new(Path::new("src/pricing.ts"), "formatPrice"));

        let json = serde_json::to_string(&FunctionId(u64::MAX)).unwrap();
        assert_eq!(json, "\"ffffffffffffffff\"");
        let back: FunctionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FunctionId(u64::MAX));
        assert!(serde_json::from_str::<FunctionId>("42").is_err());
    }
}
