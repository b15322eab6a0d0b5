//! Cross-file resolution of calls, handlers and imports

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use wirecheck_core::{
    is_test, CallEdge, EntryPoint, EventEmit, Function, FunctionId, ImportEdge, Language, RepositoryModel, SourceFile,
};

use crate::extractor::*;

/// Bound on alias chains (`export { a } from`, re-imports, barrels).
const MAX_ALIAS_DEPTH: usize = 8;

const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

struct Unit {
    extraction: FileExtraction,
    /// Runtime import bindings: local name -> (target file, binding).
    bindings: HashMap<String, (PathBuf, ImportBinding)>,
    reexport_targets: Vec<Option<PathBuf>>,
}

impl Unit {
    fn defines(&self, local: &str) -> bool {
        self.extraction
            .functions
            .iter()
            .any(|f| f.qualified_name == local || f.owner.as_deref() == Some(local))
    }
}

/// Resolves one repository's per-file extractions into a `RepositoryModel`.
pub struct Resolver {
    units: BTreeMap<PathBuf, Unit>,
    /// Exported top-level functions by name, for the last-resort lookup.
    exported_functions: HashMap<String, Vec<FunctionId>>,
    /// Exported methods by member name.
    exported_methods: HashMap<String, Vec<FunctionId>>,
}

impl Resolver {
    pub fn new(extractions: BTreeMap<PathBuf, FileExtraction>) -> Self {
        let known: HashSet<PathBuf> = extractions.keys().cloned().collect();
        let mut exported_functions: HashMap<String, Vec<FunctionId>> = HashMap::new();
        let mut exported_methods: HashMap<String, Vec<FunctionId>> = HashMap::new();

        let units = extractions
            .into_iter()
            .map(|(path, extraction)| {
                let mut bindings = HashMap::new();
                for import in extraction.imports.iter().filter(|i| !i.type_only) {
                    let Some(target) = resolve_specifier(&known, &path, &import.specifier) else {
                        continue;
                    };
                    for binding in &import.bindings {
                        bindings.insert(binding.local().to_string(), (target.clone(), binding.clone()));
                    }
                }
                let reexport_targets = extraction
                    .reexports
                    .iter()
                    .map(|r| resolve_specifier(&known, &path, &r.specifier))
                    .collect();

                for function in extraction.functions.iter().filter(|f| extraction.is_exported(f)) {
                    let id = FunctionId::new(&path, &function.qualified_name);
                    let index = if function.owner.is_some() {
                        &mut exported_methods
                    } else {
                        &mut exported_functions
                    };
                    index.entry(function.name.clone()).or_default().push(id);
                }

                (
                    path,
                    Unit {
                        extraction,
                        bindings,
                        reexport_targets,
                    },
                )
            })
            .collect();

        Resolver {
            units,
            exported_functions,
            exported_methods,
        }
    }

    fn function_id(&self, file: &Path, qualified_name: &str) -> Option<FunctionId> {
        let unit = self.units.get(file)?;
        unit.extraction
            .function(qualified_name)
            .map(|_| FunctionId::new(file, qualified_name))
    }

    /// Where a binding visible in `file` is defined: (defining file, local name there).
    fn locate(&self, file: &Path, local: &str, depth: usize) -> Option<(PathBuf, String)> {
        if depth > MAX_ALIAS_DEPTH {
            return None;
        }
        let unit = self.units.get(file)?;
        if unit.defines(local) {
            return Some((file.to_path_buf(), local.to_string()));
        }
        let (target, binding) = unit.bindings.get(local)?;
        match binding {
            ImportBinding::Named { imported, .. } => self.resolve_export(target, imported, depth + 1),
            ImportBinding::Default { .. } => self.resolve_export(target, "default", depth + 1),
            ImportBinding::Namespace { .. } => None,
        }
    }

    fn resolve_export(&self, file: &Path, exported: &str, depth: usize) -> Option<(PathBuf, String)> {
        if depth > MAX_ALIAS_DEPTH {
            return None;
        }
        let unit = self.units.get(file)?;
        if let Some(local) = unit.extraction.export_local(exported) {
            return self.locate(file, local, depth + 1);
        }
        for (reexport, target) in unit.extraction.reexports.iter().zip(&unit.reexport_targets) {
            let Some(target) = target else {
                continue;
            };
            if let Some((imported, _)) = reexport.names.iter().find(|(_, name)| name == exported) {
                return self.resolve_export(target, imported, depth + 1);
            }
            if reexport.star && exported != "default" {
                if let Some(found) = self.resolve_export(target, exported, depth + 1) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn unique(index: &HashMap<String, Vec<FunctionId>>, name: &str) -> Option<FunctionId> {
        match index.get(name).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    /// Resolve a call site: same file first, then imports, then a unique
    /// exported name anywhere in the repository.
    pub fn resolve_call(&self, file: &Path, caller: &str, callee: &CalleeRef, construct: bool) -> Option<FunctionId> {
        let unit = self.units.get(file)?;
        match callee {
            CalleeRef::Identifier(name) => {
                if let Some(id) = self.function_id(file, name) {
                    return Some(id);
                }
                if let Some((target, binding)) = unit.bindings.get(name) {
                    let exported = match binding {
                        ImportBinding::Named { imported, .. } => imported.as_str(),
                        ImportBinding::Default { .. } | ImportBinding::Namespace { .. } => "default",
                    };
                    let (defining, local) = self.resolve_export(target, exported, 0)?;
                    return self.function_id(&defining, &local);
                }
                Self::unique(&self.exported_functions, name)
            }
            CalleeRef::Member { object, property } => {
                if object == "this" {
                    if let Some((class, _)) = caller.split_once('.') {
                        if let Some(id) = self.function_id(file, &format!("{class}.{property}")) {
                            return Some(id);
                        }
                    }
                }
                if let Some(id) = self.function_id(file, &format!("{object}.{property}")) {
                    return Some(id);
                }
                if let Some((target, binding)) = unit.bindings.get(object.as_str()) {
                    let found = match binding {
                        ImportBinding::Namespace { .. } => self
                            .resolve_export(target, property, 0)
                            .and_then(|(defining, local)| self.function_id(&defining, &local)),
                        ImportBinding::Named { imported, .. } => self
                            .resolve_export(target, imported, 0)
                            .and_then(|(defining, local)| self.function_id(&defining, &format!("{local}.{property}"))),
                        ImportBinding::Default { .. } => self
                            .resolve_export(target, "default", 0)
                            .and_then(|(defining, local)| self.function_id(&defining, &format!("{local}.{property}"))),
                    };
                    if found.is_some() {
                        return found;
                    }
                }
                if construct {
                    return None;
                }
                Self::unique(&self.exported_methods, property)
            }
        }
    }

    fn resolve_handler(&self, file: &Path, registration: &RawRegistration) -> Option<FunctionId> {
        match &registration.handler {
            HandlerRef::Inline(name) => self.function_id(file, name),
            HandlerRef::Reference(callee) => self.resolve_call(file, &registration.registered_by, callee, false),
        }
    }

    /// Assemble the repository model. Output order follows file path order.
    pub fn into_model(self) -> RepositoryModel {
        let mut model = RepositoryModel::default();
        let mut unresolved_calls = 0usize;

        for (path, unit) in &self.units {
            let extraction = &unit.extraction;
            model.files.push(SourceFile {
                path: path.clone(),
                language: Language::from_path(path),
                loc: extraction.loc,
                is_test: is_test(&path.to_string_lossy()),
                is_active: true,
            });

            for raw in &extraction.functions {
                model.functions.push(Function {
                    id: FunctionId::new(path, &raw.qualified_name),
                    name: raw.name.clone(),
                    qualified_name: raw.qualified_name.clone(),
                    file: path.clone(),
                    line_start: raw.line_start,
                    line_end: raw.line_end,
                    is_exported: extraction.is_exported(raw),
                    is_async: raw.is_async,
                    complexity: raw.complexity,
                });
            }

            let mut seen = HashSet::new();
            for call in &extraction.calls {
                let (Some(caller), Some(callee)) = (
                    self.function_id(path, &call.caller),
                    self.resolve_call(path, &call.caller, &call.callee, call.is_construct),
                ) else {
                    unresolved_calls += 1;
                    continue;
                };
                if seen.insert((caller, callee)) {
                    model.call_edges.push(CallEdge {
                        caller,
                        callee,
                        line: Some(call.line),
                    });
                }
            }

            for (import, target) in extraction
                .imports
                .iter()
                .map(|i| (i, resolve_specifier_in(&self.units, path, &i.specifier)))
            {
                if let Some(to) = target {
                    model.import_edges.push(ImportEdge {
                        from: path.clone(),
                        to,
                        names: import.bindings.iter().map(|b| b.local().to_string()).collect(),
                        type_only: import.type_only,
                    });
                }
            }
            for (reexport, target) in extraction.reexports.iter().zip(&unit.reexport_targets) {
                if let Some(to) = target {
                    model.import_edges.push(ImportEdge {
                        from: path.clone(),
                        to: to.clone(),
                        names: reexport.names.iter().map(|(_, exported)| exported.clone()).collect(),
                        type_only: false,
                    });
                }
            }

            for registration in &extraction.registrations {
                model.entry_points.push(EntryPoint {
                    kind: registration.kind.clone(),
                    handler: self.resolve_handler(path, registration),
                    handler_name: registration.handler.display_name(),
                    file: path.clone(),
                    registered_by: self.function_id(path, &registration.registered_by),
                    line: Some(registration.line),
                });
            }

            for emit in &extraction.emits {
                if let Some(emitter) = self.function_id(path, &emit.emitter) {
                    model.emits.push(EventEmit {
                        emitter,
                        event: emit.event.clone(),
                        line: Some(emit.line),
                    });
                }
            }
        }

        debug!("{} call sites left unresolved (external or dynamic)", unresolved_calls);
        model
    }
}

fn resolve_specifier_in(units: &BTreeMap<PathBuf, Unit>, from: &Path, specifier: &str) -> Option<PathBuf> {
    resolve_module(from, specifier, |candidate| units.contains_key(candidate))
}

fn resolve_specifier(known: &HashSet<PathBuf>, from: &Path, specifier: &str) -> Option<PathBuf> {
    resolve_module(from, specifier, |candidate| known.contains(candidate))
}

/// Resolve a relative module specifier to a repository file. Package imports
/// are external and resolve to nothing.
pub fn resolve_module(from: &Path, specifier: &str, exists: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") && specifier != "." && specifier != ".." {
        return None;
    }
    let base = from.parent().unwrap_or(Path::new(""));
    let joined = normalize(&base.join(specifier));
    let joined_text = joined.to_string_lossy().to_string();

    let mut candidates = vec![joined.clone()];
    // ESM TypeScript imports name the emitted `.js` file.
    if let Some(ext) = joined.extension().and_then(|e| e.to_str()) {
        if matches!(ext, "js" | "jsx" | "mjs" | "cjs") {
            let stem = joined.with_extension("");
            for ts in ["ts", "tsx", "mts", "cts"] {
                candidates.push(stem.with_extension(ts));
            }
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        candidates.push(PathBuf::from(format!("{joined_text}.{ext}")));
    }
    for ext in RESOLVE_EXTENSIONS {
        candidates.push(joined.join(format!("index.{ext}")));
    }

    candidates.into_iter().find(|candidate| exists(candidate.as_path()))
}

/// Lexically normalise `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.into_iter().collect()
}
