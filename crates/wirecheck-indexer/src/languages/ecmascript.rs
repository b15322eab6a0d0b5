//! TypeScript and JavaScript extraction using tree-sitter
//!
//! Both grammars share node kinds for everything extracted here; the only
//! TypeScript-specific syntax that matters is `import type`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tree_sitter::{Node, Tree};
use wirecheck_core::{EntryPointKind, EventPattern, MODULE_SCOPE};

use crate::extractor::*;

const HTTP_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "options", "head", "all"];
const LISTENER_METHODS: &[&str] = &["on", "once", "addListener", "prependListener"];
const CRON_METHODS: &[&str] = &["schedule", "scheduleJob"];

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];
const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "for_of_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

pub struct EcmaScriptExtractor {
    typescript: bool,
}

impl EcmaScriptExtractor {
    pub const fn new(typescript: bool) -> Self {
        Self { typescript }
    }
}

impl LanguageExtractor for EcmaScriptExtractor {
    fn extract(&self, _path: &Path, tree: &Tree, source: &str) -> FileExtraction {
        let mut walker = Walker::new(source, self.typescript);
        walker.visit(tree.root_node());
        walker.out
    }
}

/// How a function-like node is named.
struct Definition {
    qualified_name: String,
    name: String,
    owner: Option<String>,
}

impl Definition {
    fn plain(name: &str) -> Self {
        Definition {
            qualified_name: name.to_string(),
            name: name.to_string(),
            owner: None,
        }
    }

    fn member(owner: Option<String>, name: &str) -> Self {
        match owner {
            Some(owner) => Definition {
                qualified_name: format!("{owner}.{name}"),
                name: name.to_string(),
                owner: Some(owner),
            },
            None => Definition::plain(name),
        }
    }
}

struct Walker<'a> {
    source: &'a str,
    typescript: bool,
    out: FileExtraction,
    /// Indices into `out.functions`; the bottom entry is the module scope.
    scopes: Vec<usize>,
    /// Synthetic names for inline handlers, keyed by node id.
    inline_names: HashMap<usize, String>,
    /// Bindings known not to be functions (routers, instances, literals).
    non_functions: HashSet<String>,
}

impl<'a> Walker<'a> {
    fn new(source: &'a str, typescript: bool) -> Self {
        let loc = source.lines().count() as u32;
        let mut out = FileExtraction {
            loc,
            ..FileExtraction::default()
        };
        out.functions.push(RawFunction {
            qualified_name: MODULE_SCOPE.to_string(),
            name: MODULE_SCOPE.to_string(),
            owner: None,
            line_start: 1,
            line_end: loc.max(1),
            is_async: false,
            complexity: 1,
        });
        Walker {
            source,
            typescript,
            out,
            scopes: vec![0],
            inline_names: HashMap::new(),
            non_functions: HashSet::new(),
        }
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: Node, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    fn current_scope(&self) -> String {
        let idx = self.scopes.last().copied().unwrap_or(0);
        self.out.functions[idx].qualified_name.clone()
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node) {
        let kind = node.kind();

        if FUNCTION_KINDS.contains(&kind) {
            match self.definition(node) {
                Some(def) => {
                    let idx = self.define(def, node);
                    self.scopes.push(idx);
                    self.visit_children(node);
                    self.scopes.pop();
                }
                None => self.visit_children(node),
            }
            return;
        }

        match kind {
            "import_statement" => {
                self.import(node);
                return;
            }
            "export_statement" => self.export(node),
            "call_expression" => self.call(node),
            "new_expression" => self.construct(node),
            "variable_declarator" => self.declarator(node),
            "assignment_expression" => self.commonjs_export(node),
            "binary_expression" => {
                if matches!(self.field_text(node, "operator"), Some("&&" | "||" | "??")) {
                    self.bump_complexity();
                }
            }
            _ if DECISION_KINDS.contains(&kind) => self.bump_complexity(),
            _ => {}
        }
        self.visit_children(node);
    }

    fn bump_complexity(&mut self) {
        if let Some(&idx) = self.scopes.last() {
            self.out.functions[idx].complexity += 1;
        }
    }

    fn define(&mut self, def: Definition, node: Node) -> usize {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        if let Some(idx) = self.out.functions.iter().position(|f| f.qualified_name == def.qualified_name) {
            // Redefinition in another scope folds into the first one.
            let existing = &mut self.out.functions[idx];
            existing.line_end = existing.line_end.max(line_end);
            return idx;
        }
        self.out.functions.push(RawFunction {
            qualified_name: def.qualified_name,
            name: def.name,
            owner: def.owner,
            line_start,
            line_end,
            is_async: has_token(node, "async"),
            complexity: 1,
        });
        self.out.functions.len() - 1
    }

    /// Name a function-like node, or `None` when it is an anonymous callback
    /// whose calls belong to the enclosing function.
    fn definition(&self, node: Node) -> Option<Definition> {
        if let Some(synthetic) = self.inline_names.get(&node.id()) {
            return Some(Definition::plain(synthetic));
        }

        if node.kind() == "method_definition" {
            let name = self.field_text(node, "name")?;
            let container = node.parent()?;
            let owner = match container.kind() {
                "class_body" => Some(self.class_name(container.parent()?)?),
                "object" => self.object_owner(container)?,
                _ => return None,
            };
            return Some(Definition::member(owner, name));
        }

        let parent = node.parent()?;
        match parent.kind() {
            "variable_declarator" => {
                let name = parent.child_by_field_name("name")?;
                if name.kind() != "identifier" {
                    return None;
                }
                Some(Definition::plain(self.text(name)))
            }
            "assignment_expression" => {
                let left = parent.child_by_field_name("left")?;
                self.assignment_target(left, node)
            }
            "pair" => {
                let key = self.property_key(parent.child_by_field_name("key")?)?;
                let owner = self.object_owner(parent.parent()?)?;
                Some(Definition::member(owner, key))
            }
            "public_field_definition" | "field_definition" => {
                let key = parent
                    .child_by_field_name("name")
                    .or_else(|| parent.child_by_field_name("property"))?;
                let class = parent.parent()?.parent()?;
                Some(Definition::member(Some(self.class_name(class)?), self.text(key)))
            }
            "export_statement" => {
                let name = self.field_text(node, "name").unwrap_or("default");
                Some(Definition::plain(name))
            }
            _ => {
                let name = node.child_by_field_name("name")?;
                Some(Definition::plain(self.text(name)))
            }
        }
    }

    /// `exports.x = fn`, `module.exports = fn`, `obj.x = fn`.
    fn assignment_target(&self, left: Node, function: Node) -> Option<Definition> {
        let target = self.text(left);
        if target == "module.exports" {
            let name = self.field_text(function, "name").unwrap_or("default");
            return Some(Definition::plain(name));
        }
        if let Some(name) = commonjs_export_name(target) {
            return Some(Definition::plain(name));
        }
        if left.kind() != "member_expression" {
            return None;
        }
        let object = left.child_by_field_name("object")?;
        if object.kind() != "identifier" {
            return None;
        }
        let property = self.field_text(left, "property")?;
        Some(Definition::member(Some(self.text(object).to_string()), property))
    }

    fn property_key(&self, key: Node) -> Option<&'a str> {
        match key.kind() {
            "property_identifier" | "identifier" => Some(self.text(key)),
            "string" => Some(string_value(self.text(key))),
            _ => None,
        }
    }

    /// Owner prefix for members of an object literal:
    /// `Some(Some(var))` for `const var = {..}`, `Some(None)` for
    /// `module.exports = {..}`, `None` for anything else.
    fn object_owner(&self, object: Node) -> Option<Option<String>> {
        let parent = object.parent()?;
        match parent.kind() {
            "variable_declarator" => {
                let name = parent.child_by_field_name("name")?;
                (name.kind() == "identifier").then(|| Some(self.text(name).to_string()))
            }
            "assignment_expression" => {
                let left = self.field_text(parent, "left")?;
                (left == "module.exports").then_some(None)
            }
            "export_statement" => Some(Some("default".to_string())),
            _ => None,
        }
    }

    fn class_name(&self, class: Node) -> Option<String> {
        if let Some(name) = self.field_text(class, "name") {
            return Some(name.to_string());
        }
        let parent = class.parent()?;
        match parent.kind() {
            "variable_declarator" => self.field_text(parent, "name").map(str::to_string),
            "export_statement" => Some("default".to_string()),
            _ => None,
        }
    }

    fn import(&mut self, node: Node) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let specifier = string_value(self.text(source)).to_string();
        let type_only = self.typescript && has_token(node, "type");
        let mut bindings = Vec::new();

        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() != "import_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for part in clause.named_children(&mut inner) {
                match part.kind() {
                    "identifier" => bindings.push(ImportBinding::Default {
                        local: self.text(part).to_string(),
                    }),
                    "namespace_import" => {
                        if let Some(local) = first_named_of_kind(part, "identifier") {
                            bindings.push(ImportBinding::Namespace {
                                local: self.text(local).to_string(),
                            });
                        }
                    }
                    "named_imports" => self.named_imports(part, &mut bindings),
                    _ => {}
                }
            }
        }

        self.out.imports.push(RawImport {
            specifier,
            bindings,
            type_only,
            line: node.start_position().row as u32 + 1,
        });
    }

    fn named_imports(&self, node: Node, bindings: &mut Vec<ImportBinding>) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if spec.kind() != "import_specifier" || (self.typescript && has_token(spec, "type")) {
                continue;
            }
            let Some(imported) = self.field_text(spec, "name") else {
                continue;
            };
            let local = self.field_text(spec, "alias").unwrap_or(imported);
            bindings.push(ImportBinding::Named {
                imported: string_value(imported).to_string(),
                local: local.to_string(),
            });
        }
    }

    fn export(&mut self, node: Node) {
        let is_default = has_token(node, "default");

        if let Some(source) = node.child_by_field_name("source") {
            let specifier = string_value(self.text(source)).to_string();
            let names = match first_named_of_kind(node, "export_clause") {
                Some(clause) => self
                    .export_specifiers(clause)
                    .into_iter()
                    .map(|(exported, local)| (local, exported))
                    .collect(),
                None => Vec::new(),
            };
            let star = names.is_empty() && has_token(node, "*") && first_named_of_kind(node, "namespace_export").is_none();
            self.out.reexports.push(RawReexport {
                specifier,
                names,
                star,
            });
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            match declaration.kind() {
                "function_declaration" | "generator_function_declaration" | "class_declaration"
                | "abstract_class_declaration" => {
                    if let Some(name) = self.field_text(declaration, "name") {
                        let exported = if is_default { "default" } else { name };
                        self.add_export(exported, name);
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    let mut cursor = declaration.walk();
                    for declarator in declaration.named_children(&mut cursor) {
                        if declarator.kind() != "variable_declarator" {
                            continue;
                        }
                        if let Some(name) = declarator.child_by_field_name("name") {
                            if name.kind() == "identifier" {
                                let name = self.text(name);
                                self.add_export(name, name);
                            }
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            let local = match value.kind() {
                "identifier" => self.text(value).to_string(),
                "function_expression" | "function" | "generator_function" | "class" => self
                    .field_text(value, "name")
                    .unwrap_or("default")
                    .to_string(),
                _ => "default".to_string(),
            };
            self.add_export("default", &local);
            return;
        }

        if let Some(clause) = first_named_of_kind(node, "export_clause") {
            for (exported, local) in self.export_specifiers(clause) {
                self.add_export(&exported, &local);
            }
        }
    }

    /// (exported, local) pairs of an export clause.
    fn export_specifiers(&self, clause: Node) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut cursor = clause.walk();
        for spec in clause.named_children(&mut cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let Some(local) = self.field_text(spec, "name") else {
                continue;
            };
            let local = string_value(local);
            let exported = self.field_text(spec, "alias").map(string_value).unwrap_or(local);
            pairs.push((exported.to_string(), local.to_string()));
        }
        pairs
    }

    fn add_export(&mut self, exported: &str, local: &str) {
        let pair = (exported.to_string(), local.to_string());
        if !self.out.exports.contains(&pair) {
            self.out.exports.push(pair);
        }
    }

    /// CommonJS exports: `module.exports = ...`, `exports.x = ...`.
    fn commonjs_export(&mut self, node: Node) {
        let (Some(left), Some(right)) = (node.child_by_field_name("left"), node.child_by_field_name("right")) else {
            return;
        };
        let target = self.text(left);

        if target == "module.exports" {
            match right.kind() {
                "identifier" => {
                    let local = self.text(right);
                    self.add_export("default", local);
                }
                "object" => {
                    let mut cursor = right.walk();
                    for member in right.named_children(&mut cursor) {
                        match member.kind() {
                            "shorthand_property_identifier" => {
                                let name = self.text(member);
                                self.add_export(name, name);
                            }
                            "pair" => {
                                let Some(key) = member.child_by_field_name("key").and_then(|k| self.property_key(k))
                                else {
                                    continue;
                                };
                                let local = match member.child_by_field_name("value") {
                                    Some(value) if value.kind() == "identifier" => self.text(value),
                                    _ => key,
                                };
                                self.add_export(key, local);
                            }
                            "method_definition" => {
                                if let Some(name) = self.field_text(member, "name") {
                                    self.add_export(name, name);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {
                    let local = self.field_text(right, "name").unwrap_or("default");
                    self.add_export("default", local);
                }
            }
            return;
        }

        if let Some(name) = commonjs_export_name(target) {
            let local = if right.kind() == "identifier" { self.text(right) } else { name };
            self.add_export(name, local);
        }
    }

    fn declarator(&mut self, node: Node) {
        let (Some(name), Some(value)) = (node.child_by_field_name("name"), node.child_by_field_name("value")) else {
            return;
        };

        if let Some(specifier) = self.require_specifier(value) {
            let bindings = match name.kind() {
                "identifier" => vec![ImportBinding::Namespace {
                    local: self.text(name).to_string(),
                }],
                "object_pattern" => self.destructured_bindings(name),
                _ => Vec::new(),
            };
            self.out.imports.push(RawImport {
                specifier,
                bindings,
                type_only: false,
                line: node.start_position().row as u32 + 1,
            });
            return;
        }

        if name.kind() == "identifier" && self.is_non_function_value(value) {
            self.non_functions.insert(self.text(name).to_string());
        }
    }

    fn require_specifier(&self, value: Node) -> Option<String> {
        if value.kind() != "call_expression" || self.field_text(value, "function")? != "require" {
            return None;
        }
        let args = arguments(value);
        let first = args.first()?;
        literal_string(*first, self.source).map(str::to_string)
    }

    fn destructured_bindings(&self, pattern: Node) -> Vec<ImportBinding> {
        let mut bindings = Vec::new();
        let mut cursor = pattern.walk();
        for part in pattern.named_children(&mut cursor) {
            match part.kind() {
                "shorthand_property_identifier_pattern" => {
                    let name = self.text(part).to_string();
                    bindings.push(ImportBinding::Named {
                        imported: name.clone(),
                        local: name,
                    });
                }
                "pair_pattern" => {
                    let (Some(key), Some(value)) = (self.field_text(part, "key"), part.child_by_field_name("value"))
                    else {
                        continue;
                    };
                    if value.kind() == "identifier" {
                        bindings.push(ImportBinding::Named {
                            imported: key.to_string(),
                            local: self.text(value).to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        bindings
    }

    fn is_non_function_value(&self, value: Node) -> bool {
        match value.kind() {
            "new_expression" | "object" | "array" | "string" | "number" | "template_string" => true,
            "call_expression" => {
                let callee = self.field_text(value, "function").unwrap_or("");
                callee == "express" || callee == "Router" || callee.ends_with(".Router")
            }
            _ => false,
        }
    }

    fn call(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let caller = self.current_scope();
        let line = node.start_position().row as u32 + 1;

        match function.kind() {
            "identifier" => {
                let name = self.text(function);
                if name != "require" {
                    self.out.calls.push(RawCall {
                        caller,
                        callee: CalleeRef::Identifier(name.to_string()),
                        line,
                        is_construct: false,
                    });
                }
            }
            "member_expression" => {
                let (Some(object), Some(property)) =
                    (function.child_by_field_name("object"), self.field_text(function, "property"))
                else {
                    return;
                };
                self.out.calls.push(RawCall {
                    caller: caller.clone(),
                    callee: CalleeRef::Member {
                        object: self.text(object).to_string(),
                        property: property.to_string(),
                    },
                    line,
                    is_construct: false,
                });
                self.registration(node, object, property, caller, line);
            }
            _ => {}
        }
    }

    fn construct(&mut self, node: Node) {
        let Some(constructor) = node.child_by_field_name("constructor") else {
            return;
        };
        if constructor.kind() != "identifier" {
            return;
        }
        let class = self.text(constructor);
        let caller = self.current_scope();
        let line = node.start_position().row as u32 + 1;
        self.out.calls.push(RawCall {
            caller: caller.clone(),
            callee: CalleeRef::Member {
                object: class.to_string(),
                property: "constructor".to_string(),
            },
            line,
            is_construct: true,
        });

        if class == "CronJob" {
            let args = arguments(node);
            if let (Some(schedule), Some(handler)) =
                (args.first().and_then(|a| literal_string(*a, self.source)), args.get(1))
            {
                let kind = EntryPointKind::CronJob {
                    schedule: schedule.to_string(),
                };
                self.register(kind, std::slice::from_ref(handler), caller, line);
            }
        }
    }

    /// Recognise entry-point registrations and emits on `<object>.<property>(...)`.
    fn registration(&mut self, node: Node, object: Node, property: &str, caller: String, line: u32) {
        let args = arguments(node);
        let first_string = args.first().and_then(|a| literal_string(*a, self.source));

        if HTTP_METHODS.contains(&property) {
            if let Some(route) = self.chained_route(object) {
                let kind = EntryPointKind::Endpoint {
                    method: property.to_uppercase(),
                    route,
                };
                self.register(kind, &args, caller, line);
            } else if let Some(route) = first_string.filter(|r| is_route(r)) {
                if args.len() > 1 {
                    let kind = EntryPointKind::Endpoint {
                        method: property.to_uppercase(),
                        route: route.to_string(),
                    };
                    self.register(kind, &args[1..], caller, line);
                }
            }
            return;
        }

        if CRON_METHODS.contains(&property) {
            let Some(mut schedule) = first_string else {
                return;
            };
            let mut rest = &args[1..];
            // scheduleJob('name', 'expr', fn)
            if let Some(expr) = rest.first().and_then(|a| literal_string(*a, self.source)) {
                schedule = expr;
                rest = &rest[1..];
            }
            if !rest.is_empty() {
                let kind = EntryPointKind::CronJob {
                    schedule: schedule.to_string(),
                };
                self.register(kind, &rest[..1], caller, line);
            }
            return;
        }

        if LISTENER_METHODS.contains(&property) {
            if let Some(event) = first_string {
                let kind = EntryPointKind::EventBinding {
                    event: event.to_string(),
                    pattern: EventPattern::Emitter,
                };
                self.register(kind, &args[1..], caller, line);
            }
            return;
        }

        if property == "emit" {
            if let Some(event) = first_string {
                self.out.emits.push(RawEmit {
                    emitter: caller,
                    event: event.to_string(),
                    line,
                });
            }
            return;
        }

        if property == "use" && !args.is_empty() {
            let (path, handlers) = match first_string {
                Some(path) => (path, &args[1..]),
                None => ("/", &args[..]),
            };
            let kind = EntryPointKind::EventBinding {
                event: path.to_string(),
                pattern: EventPattern::Middleware,
            };
            self.register(kind, handlers, caller, line);
        }
    }

    /// `router.route('/x').get(h)` and `.route('/x').get(a).post(b)`.
    fn chained_route(&self, object: Node) -> Option<String> {
        if object.kind() != "call_expression" {
            return None;
        }
        let function = object.child_by_field_name("function")?;
        if function.kind() != "member_expression" {
            return None;
        }
        let property = self.field_text(function, "property")?;
        if property == "route" {
            let args = arguments(object);
            return literal_string(*args.first()?, self.source).map(str::to_string);
        }
        if HTTP_METHODS.contains(&property) {
            return self.chained_route(function.child_by_field_name("object")?);
        }
        None
    }

    fn register(&mut self, kind: EntryPointKind, handler_args: &[Node], registered_by: String, line: u32) {
        for arg in handler_args {
            for handler in self.handler_refs(*arg) {
                self.out.registrations.push(RawRegistration {
                    kind: kind.clone(),
                    handler,
                    registered_by: registered_by.clone(),
                    line,
                });
            }
        }
    }

    fn handler_refs(&mut self, node: Node) -> Vec<HandlerRef> {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                if self.non_functions.contains(name) || name == "undefined" {
                    return Vec::new();
                }
                vec![HandlerRef::Reference(CalleeRef::Identifier(name.to_string()))]
            }
            "member_expression" => {
                let (Some(object), Some(property)) = (self.field_text(node, "object"), self.field_text(node, "property"))
                else {
                    return Vec::new();
                };
                vec![HandlerRef::Reference(CalleeRef::Member {
                    object: object.to_string(),
                    property: property.to_string(),
                })]
            }
            "arrow_function" | "function_expression" | "function" => vec![HandlerRef::Inline(self.inline_name(node))],
            "array" => {
                let mut cursor = node.walk();
                let elements: Vec<Node> = node.named_children(&mut cursor).collect();
                elements.into_iter().flat_map(|e| self.handler_refs(e)).collect()
            }
            "call_expression" => {
                // wrapper(handler): the first argument that is itself a handler
                for arg in arguments(node) {
                    let found = self.handler_refs(arg);
                    if !found.is_empty() {
                        return found;
                    }
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn inline_name(&mut self, node: Node) -> String {
        if let Some(existing) = self.inline_names.get(&node.id()) {
            return existing.clone();
        }
        let line = node.start_position().row + 1;
        let base = format!("<handler@{line}>");
        let mut name = base.clone();
        let mut n = 2;
        while self.inline_names.values().any(|v| *v == name) {
            name = format!("<handler@{line}#{n}>");
            n += 1;
        }
        self.inline_names.insert(node.id(), name.clone());
        name
    }
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| !c.is_named() && c.kind() == token);
    found
}

fn first_named_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn arguments(call: Node) -> Vec<Node> {
    let Some(args) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    let collected = args.named_children(&mut cursor).filter(|n| n.kind() != "comment").collect();
    collected
}

/// Contents of a plain string literal or a template without substitutions.
fn literal_string<'s>(node: Node, source: &'s str) -> Option<&'s str> {
    let text = node.utf8_text(source.as_bytes()).ok()?;
    match node.kind() {
        "string" => Some(string_value(text)),
        "template_string" => {
            let mut cursor = node.walk();
            let substituted = node.named_children(&mut cursor).any(|c| c.kind() == "template_substitution");
            (!substituted).then(|| text.trim_matches('`'))
        }
        _ => None,
    }
}

fn string_value(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

fn is_route(route: &str) -> bool {
    route.starts_with('/') || route == "*"
}

/// `exports.x` or `module.exports.x` -> `x`.
fn commonjs_export_name(target: &str) -> Option<&str> {
    let name = target
        .strip_prefix("module.exports.")
        .or_else(|| target.strip_prefix("exports."))?;
    (!name.is_empty() && !name.contains('.')).then_some(name)
}
