//! Per-file extraction output and the language extractor trait
//!
//! Extractors see one file at a time, so everything that points outside the
//! file is recorded by name and resolved later by the coordinator.

use std::path::Path;

use wirecheck_core::EntryPointKind;

/// A function-like definition, identified by its qualified name within the file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFunction {
    pub qualified_name: String,
    pub name: String,
    /// Owning class or object binding for `Owner.member` names.
    pub owner: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub is_async: bool,
    pub complexity: u32,
}

/// The callee expression of a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeRef {
    /// `foo()`
    Identifier(String),
    /// `obj.foo()`; `object` is the source text of the receiver.
    Member { object: String, property: String },
}

impl CalleeRef {
    pub fn display_name(&self) -> String {
        match self {
            CalleeRef::Identifier(name) => name.clone(),
            CalleeRef::Member { object, property } => format!("{object}.{property}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    /// Qualified name of the enclosing function (or the module scope).
    pub caller: String,
    pub callee: CalleeRef,
    pub line: u32,
    /// `new Foo()` targets the constructor and never falls back to name lookup.
    pub is_construct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Named { imported: String, local: String },
    Default { local: String },
    Namespace { local: String },
}

impl ImportBinding {
    pub fn local(&self) -> &str {
        match self {
            ImportBinding::Named { local, .. } | ImportBinding::Default { local } | ImportBinding::Namespace { local } => {
                local
            }
        }
    }
}

/// An `import` statement or `require()` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImport {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
    pub type_only: bool,
    pub line: u32,
}

/// `export { a as b } from './x'` or `export * from './x'`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReexport {
    pub specifier: String,
    /// (imported, exported); empty together with `star` for `export *`.
    pub names: Vec<(String, String)>,
    pub star: bool,
}

/// Where a registered handler points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerRef {
    /// An inline function given a synthetic name in this file.
    Inline(String),
    Reference(CalleeRef),
}

impl HandlerRef {
    pub fn display_name(&self) -> String {
        match self {
            HandlerRef::Inline(name) => name.clone(),
            HandlerRef::Reference(callee) => callee.display_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRegistration {
    pub kind: EntryPointKind,
    pub handler: HandlerRef,
    pub registered_by: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEmit {
    pub emitter: String,
    pub event: String,
    pub line: u32,
}

/// Everything an extractor learned from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtraction {
    pub functions: Vec<RawFunction>,
    pub calls: Vec<RawCall>,
    pub imports: Vec<RawImport>,
    pub reexports: Vec<RawReexport>,
    /// exported name -> local binding name (`default` for default exports).
    pub exports: Vec<(String, String)>,
    pub registrations: Vec<RawRegistration>,
    pub emits: Vec<RawEmit>,
    pub loc: u32,
}

impl FileExtraction {
    pub fn function(&self, qualified_name: &str) -> Option<&RawFunction> {
        self.functions.iter().find(|f| f.qualified_name == qualified_name)
    }

    /// Local binding behind an exported name.
    pub fn export_local(&self, exported: &str) -> Option<&str> {
        self.exports
            .iter()
            .find(|(name, _)| name == exported)
            .map(|(_, local)| local.as_str())
    }

    /// Whether a definition is visible outside the file, directly or through
    /// its exported owner. Constructors are never API exports.
    pub fn is_exported(&self, function: &RawFunction) -> bool {
        let exported_local = |local: &str| self.exports.iter().any(|(_, l)| l == local);
        match &function.owner {
            Some(owner) => function.name != "constructor" && exported_local(owner),
            None => exported_local(&function.qualified_name),
        }
    }
}

pub trait LanguageExtractor: Send + Sync {
    fn extract(&self, path: &Path, tree: &tree_sitter::Tree, source: &str) -> FileExtraction;
}
