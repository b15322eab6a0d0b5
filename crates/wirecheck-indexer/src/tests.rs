//! Unit tests for wirecheck-indexer on small on-disk repositories

use std::path::{Path, PathBuf};

use wirecheck_core::test_utils::{create_test_repo, write_repo};
use wirecheck_core::*;

use crate::Coordinator;

fn index(root: &Path) -> ParsedRepository {
    Coordinator::new().parse(root).unwrap()
}

fn id(model: &RepositoryModel, file: &str, qualified_name: &str) -> FunctionId {
    let path = PathBuf::from(file);
    let function = model
        .functions
        .iter()
        .find(|f| f.file == path && f.qualified_name == qualified_name)
        .unwrap_or_else(|| panic!("no function {file}:{qualified_name}"));
    function.id
}

fn has_call(model: &RepositoryModel, caller: FunctionId, callee: FunctionId) -> bool {
    model.call_edges.iter().any(|e| e.caller == caller && e.callee == callee)
}

fn statuses(parsed: &ParsedRepository, targets: &[FunctionId]) -> Vec<ReachabilityStatus> {
    let graph = RepoGraph::build(parsed.model.clone()).unwrap();
    let result = ReachabilityEngine::default().classify(&graph, targets);
    targets.iter().map(|t| result[t]).collect()
}

#[test]
fn test_index_widget_repo() {
    let repo = create_test_repo();
    let parsed = index(repo.path());
    let model = &parsed.model;

    assert_eq!(model.files.len(), 6);
    assert_eq!(parsed.sources.len(), 6);
    assert!(model.files.iter().any(|f| f.path == Path::new("src/pricing.test.ts") && f.is_test));

    let create = id(model, "src/widgets.ts", "createWidget");
    let validate = id(model, "src/validation.ts", "validateWidget");
    let format = id(model, "src/pricing.ts", "formatPrice");
    let discount = id(model, "src/pricing.ts", "computeDiscount");
    assert!(has_call(model, create, validate));

    let endpoint = model
        .entry_points
        .iter()
        .find(|e| matches!(&e.kind, EntryPointKind::Endpoint { route, .. } if route == "/widgets"))
        .unwrap();
    assert_eq!(endpoint.handler, Some(create));
    assert_eq!(endpoint.file, PathBuf::from("src/app.ts"));

    assert_eq!(
        statuses(&parsed, &[create, validate, format, discount]),
        vec![
            ReachabilityStatus::EntryPoint,
            ReachabilityStatus::Reachable,
            ReachabilityStatus::TestOnly,
            ReachabilityStatus::Unreachable,
        ]
    );
}

#[test]
fn test_import_edges_carry_type_only() {
    let repo = write_repo(&[
        ("src/types.ts", "export interface Widget { id: string }\nexport function makeId() { return '1'; }\n"),
        (
            "src/a.ts",
            "import type { Widget } from './types';\nimport { makeId } from './types';\nexport const w = makeId();\n",
        ),
    ]);
    let parsed = index(repo.path());
    let edges: Vec<(bool, Vec<String>)> = parsed
        .model
        .import_edges
        .iter()
        .map(|e| (e.type_only, e.names.clone()))
        .collect();
    assert_eq!(
        edges,
        vec![
            (true, vec!["Widget".to_string()]),
            (false, vec!["makeId".to_string()])
        ]
    );
}

#[test]
fn test_barrel_reexports_resolve_past_name_collisions() {
    let repo = write_repo(&[
        ("src/widgets/create.ts", "export function createWidget() { return 1; }\n"),
        ("src/widgets/index.ts", "export * from './create';\n"),
        ("src/legacy/create.ts", "export function createWidget() { return 2; }\n"),
        (
            "src/app.ts",
            "import { createWidget } from './widgets';\napp.post('/widgets', (req, res) => res.json(createWidget()));\n",
        ),
    ]);
    let parsed = index(repo.path());
    let model = &parsed.model;
    let current = id(model, "src/widgets/create.ts", "createWidget");
    let legacy = id(model, "src/legacy/create.ts", "createWidget");
    let handler = id(model, "src/app.ts", "<handler@2>");

    assert!(has_call(model, handler, current));
    assert!(!has_call(model, handler, legacy));
    assert_eq!(
        statuses(&parsed, &[current, legacy]),
        vec![ReachabilityStatus::Reachable, ReachabilityStatus::Unreachable]
    );
}

#[test]
fn test_event_bus_across_files() {
    let repo = write_repo(&[
        (
            "src/orders.ts",
            "import { bus } from './bus';\nexport function placeOrder() { bus.emit('order.placed', {}); }\n",
        ),
        ("src/bus.ts", "import { EventEmitter } from 'events';\nexport const bus = new EventEmitter();\n"),
        (
            "src/listeners.ts",
            "import { bus } from './bus';\nimport { sendMail } from './mailer';\nexport function sendReceipt() { sendMail(); }\nbus.on('order.placed', sendReceipt);\n",
        ),
        ("src/mailer.ts", "export function sendMail() {}\n"),
        (
            "src/app.ts",
            "import { placeOrder } from './orders';\nrouter.post('/orders', placeOrder);\n",
        ),
    ]);
    let parsed = index(repo.path());
    let model = &parsed.model;
    let place = id(model, "src/orders.ts", "placeOrder");
    let receipt = id(model, "src/listeners.ts", "sendReceipt");
    let mail = id(model, "src/mailer.ts", "sendMail");

    assert_eq!(model.emits.len(), 1);
    assert_eq!(model.emits[0].emitter, place);
    assert_eq!(
        statuses(&parsed, &[place, receipt, mail]),
        vec![
            ReachabilityStatus::EntryPoint,
            ReachabilityStatus::EntryPoint,
            ReachabilityStatus::Reachable,
        ]
    );
}

#[test]
fn test_class_methods_through_this_and_instances() {
    let repo = write_repo(&[
        (
            "src/service.ts",
            r#"
export class WidgetService {
    constructor() {}
    list() { return this.fetchAll(); }
    private fetchAll() { return []; }
}
"#,
        ),
        (
            "src/app.ts",
            r#"
import { WidgetService } from './service';
const service = new WidgetService();
app.get('/widgets', (req, res) => res.json(service.list()));
"#,
        ),
    ]);
    let parsed = index(repo.path());
    let model = &parsed.model;
    let module = id(model, "src/app.ts", MODULE_SCOPE);
    let constructor = id(model, "src/service.ts", "WidgetService.constructor");
    let list = id(model, "src/service.ts", "WidgetService.list");
    let fetch = id(model, "src/service.ts", "WidgetService.fetchAll");

    assert!(has_call(model, module, constructor));
    assert!(has_call(model, list, fetch));
    assert_eq!(
        statuses(&parsed, &[list, fetch]),
        vec![ReachabilityStatus::Reachable, ReachabilityStatus::Reachable]
    );
}

#[test]
fn test_commonjs_module() {
    let repo = write_repo(&[
        (
            "lib/jobs.js",
            "function nightly() { cleanup(); }\nfunction cleanup() {}\nmodule.exports = { nightly };\n",
        ),
        (
            "lib/index.js",
            "const { nightly } = require('./jobs');\ncron.schedule('0 0 * * *', nightly);\n",
        ),
    ]);
    let parsed = index(repo.path());
    let model = &parsed.model;
    let nightly = id(model, "lib/jobs.js", "nightly");
    let cleanup = id(model, "lib/jobs.js", "cleanup");

    let function = model.functions.iter().find(|f| f.id == nightly).unwrap();
    assert!(function.is_exported);
    assert_eq!(
        statuses(&parsed, &[nightly, cleanup]),
        vec![ReachabilityStatus::EntryPoint, ReachabilityStatus::Reachable]
    );
}

#[test]
fn test_unresolved_handler_is_recorded_without_target() {
    let repo = write_repo(&[("src/app.ts", "app.get('/ghost', ghostHandler);\n")]);
    let parsed = index(repo.path());
    let entry = &parsed.model.entry_points[0];
    assert_eq!(entry.handler, None);
    assert_eq!(entry.handler_name, "ghostHandler");
}

#[test]
fn test_discovery_skips_ignored_and_vendored_files() {
    let repo = write_repo(&[
        ("src/app.ts", "export function main() {}\n"),
        ("node_modules/lib/index.js", "module.exports = {};\n"),
        ("dist/app.js", "function main() {}\n"),
        (".gitignore", "generated/\n"),
        ("generated/client.ts", "export function call() {}\n"),
        ("types/global.d.ts", "declare const x: number;\n"),
        ("README.md", "# readme\n"),
    ]);
    let files = Coordinator::new().discover(repo.path());
    assert_eq!(files, vec![PathBuf::from("src/app.ts")]);
}

#[test]
fn test_indexing_is_deterministic() {
    let repo = create_test_repo();
    let coordinator = Coordinator::new();
    let first = coordinator.parse(repo.path()).unwrap();
    let second = coordinator.parse(repo.path()).unwrap();
    assert_eq!(first.model, second.model);
}
