//! Test utilities for Wirecheck

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::classify::is_test;
use crate::model::*;

/// A bare function record, for tests that never build a graph.
pub fn function(file: &str, qualified_name: &str, exported: bool) -> Function {
    let path = PathBuf::from(file);
    Function {
        id: FunctionId::new(&path, qualified_name),
        name: qualified_name.rsplit('.').next().unwrap_or(qualified_name).to_string(),
        qualified_name: qualified_name.to_string(),
        file: path,
        line_start: 1,
        line_end: 1,
        is_exported: exported,
        is_async: false,
        complexity: 1,
    }
}

/// Builds a consistent `RepositoryModel` by hand. Every file mentioned by a
/// function or registration is added to the model.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: RepositoryModel,
}

impl ModelBuilder {
    pub fn new() -> Self {
        ModelBuilder::default()
    }

    fn ensure_file(&mut self, file: &str) -> PathBuf {
        let path = PathBuf::from(file);
        if !self.model.files.iter().any(|f| f.path == path) {
            self.model.files.push(SourceFile {
                path: path.clone(),
                language: Language::from_path(&path),
                loc: 10,
                is_test: is_test(file),
                is_active: true,
            });
        }
        path
    }

    fn add_function(&mut self, file: &str, qualified_name: &str, exported: bool) -> FunctionId {
        self.ensure_file(file);
        let mut f = function(file, qualified_name, exported);
        f.line_start = self.model.functions.len() as u32 + 1;
        f.line_end = f.line_start;
        let id = f.id;
        self.model.functions.push(f);
        id
    }

    /// Add an exported function and return its id.
    pub fn export(&mut self, file: &str, qualified_name: &str) -> FunctionId {
        self.add_function(file, qualified_name, true)
    }

    /// Add a non-exported function (or a `<module>` scope).
    pub fn function(&mut self, file: &str, qualified_name: &str) -> FunctionId {
        self.add_function(file, qualified_name, false)
    }

    pub fn call(&mut self, caller: FunctionId, callee: FunctionId) {
        self.model.call_edges.push(CallEdge {
            caller,
            callee,
            line: None,
        });
    }

    pub fn emit(&mut self, emitter: FunctionId, event: &str) {
        self.model.emits.push(EventEmit {
            emitter,
            event: event.to_string(),
            line: None,
        });
    }

    fn register(&mut self, file: &str, kind: EntryPointKind, handler: Option<FunctionId>, handler_name: String) {
        let path = self.ensure_file(file);
        self.model.entry_points.push(EntryPoint {
            kind,
            handler,
            handler_name,
            file: path,
            registered_by: None,
            line: None,
        });
    }

    fn handler_name(&self, handler: FunctionId) -> String {
        self.model
            .functions
            .iter()
            .find(|f| f.id == handler)
            .map(|f| f.qualified_name.clone())
            .unwrap_or_else(|| handler.to_string())
    }

    pub fn endpoint(&mut self, file: &str, method: &str, route: &str, handler: FunctionId) {
        let name = self.handler_name(handler);
        let kind = EntryPointKind::Endpoint {
            method: method.to_string(),
            route: route.to_string(),
        };
        self.register(file, kind, Some(handler), name);
    }

    /// An endpoint whose handler the parser could not resolve.
    pub fn unresolved_endpoint(&mut self, file: &str, method: &str, route: &str, handler_name: &str) {
        let kind = EntryPointKind::Endpoint {
            method: method.to_string(),
            route: route.to_string(),
        };
        self.register(file, kind, None, handler_name.to_string());
    }

    pub fn cron(&mut self, file: &str, schedule: &str, handler: FunctionId) {
        let name = self.handler_name(handler);
        let kind = EntryPointKind::CronJob {
            schedule: schedule.to_string(),
        };
        self.register(file, kind, Some(handler), name);
    }

    pub fn event(&mut self, file: &str, event: &str, pattern: EventPattern, handler: FunctionId) {
        let name = self.handler_name(handler);
        let kind = EntryPointKind::EventBinding {
            event: event.to_string(),
            pattern,
        };
        self.register(file, kind, Some(handler), name);
    }

    pub fn build(self) -> RepositoryModel {
        self.model
    }
}

/// Write `files` (path, contents) under a fresh temporary directory.
pub fn write_repo(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, contents) in files {
        write_file(dir.path(), path, contents);
    }
    dir
}

pub fn write_file(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, contents).unwrap();
}

/// A small Express-style service: one live route, one helper only reached
/// from tests, one config-dispatched function and one dead export.
pub fn create_test_repo() -> TempDir {
    write_repo(&[
        (
            "src/app.ts",
            r#"
import express from 'express';
import { createWidget } from './widgets';

const app = express();
app.post('/widgets', createWidget);
app.listen(3000);
"#,
        ),
        (
            "src/widgets.ts",
            r#"
import { validateWidget } from './validation';

export async function createWidget(req: Request, res: Response) {
    if (!validateWidget(req.body)) {
        return res.status(400).end();
    }
    res.status(201).end();
}
"#,
        ),
        (
            "src/validation.ts",
            r#"
export function validateWidget(body: unknown): boolean {
    return body !== null && typeof body === 'object';
}
"#,
        ),
        (
            "src/pricing.ts",
            r#"
export function computeDiscount(total: number): number {
    return total > 100 ? total * 0.1 : 0;
}

export function formatPrice(value: number): string {
    return value.toFixed(2);
}
"#,
        ),
        (
            "src/pricing-config.ts",
            r#"
export const pricingRules = { discount: computeDiscount };
"#,
        ),
        (
            "src/pricing.test.ts",
            r#"
import { formatPrice } from './pricing';

describe('formatPrice', () => {
    it('rounds', () => {
        expect(formatPrice(1)).toBe('1.00');
    });
});
"#,
        ),
    ])
}
