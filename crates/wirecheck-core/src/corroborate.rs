//! Textual reference corroboration
//!
//! Independent of the call graph: looks for the identifier as a whole word in
//! other files' source text. Catches callbacks, computed dispatch and
//! config-driven invocation that call extraction misses. Used only to soften a
//! blocking verdict, never to produce one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifiers shorter than this are never corroborated.
pub const DEFAULT_MIN_IDENTIFIER_LENGTH: usize = 4;

/// Name given to anonymous default exports (`export default function () {}`,
/// `module.exports = function () {}`).
pub const DEFAULT_EXPORT: &str = "default";

const SCRIPT_EXTENSIONS: &[&str] = &[".tsx", ".mts", ".cts", ".ts", ".jsx", ".mjs", ".cjs", ".js"];

/// Source text of an analysis scope, split by classification.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    production: BTreeMap<PathBuf, String>,
    test: BTreeMap<PathBuf, String>,
}

impl SourceSet {
    pub fn new() -> Self {
        SourceSet::default()
    }

    pub fn insert(&mut self, path: PathBuf, text: String, is_test: bool) {
        if is_test {
            self.test.insert(path, text);
        } else {
            self.production.insert(path, text);
        }
    }

    pub fn production_len(&self) -> usize {
        self.production.len()
    }
}

/// What the textual pass found for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corroboration {
    /// Other production files mentioning the identifier.
    pub production_refs: Vec<PathBuf>,
    /// Test files mentioning it; these never count as corroboration.
    pub test_refs: Vec<PathBuf>,
}

impl Corroboration {
    pub fn found(&self) -> bool {
        !self.production_refs.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReferenceCorroborator {
    min_identifier_length: usize,
}

impl Default for ReferenceCorroborator {
    fn default() -> Self {
        ReferenceCorroborator::new(DEFAULT_MIN_IDENTIFIER_LENGTH)
    }
}

impl ReferenceCorroborator {
    pub fn new(min_identifier_length: usize) -> Self {
        ReferenceCorroborator { min_identifier_length }
    }

    /// Does `name` appear as a whole word in any production file other than `defining_file`?
    pub fn is_referenced(&self, name: &str, defining_file: &Path, sources: &SourceSet) -> bool {
        self.corroborate(name, defining_file, sources).found()
    }

    pub fn corroborate(&self, name: &str, defining_file: &Path, sources: &SourceSet) -> Corroboration {
        let identifier = name.rsplit('.').next().unwrap_or(name);
        if identifier.starts_with('<') {
            debug!("Skipping corroboration for synthetic function '{}'", name);
            return Corroboration::default();
        }
        if identifier == DEFAULT_EXPORT {
            return importers_of(defining_file, sources);
        }
        if identifier.chars().count() < self.min_identifier_length {
            debug!("Skipping corroboration for short identifier '{}'", identifier);
            return Corroboration::default();
        }
        let Some(pattern) = whole_word(identifier) else {
            return Corroboration::default();
        };

        let scan = |files: &BTreeMap<PathBuf, String>| -> Vec<PathBuf> {
            files
                .iter()
                .filter(|(path, _)| path.as_path() != defining_file)
                .filter(|(_, text)| pattern.is_match(text))
                .map(|(path, _)| path.clone())
                .collect()
        };

        Corroboration {
            production_refs: scan(&sources.production),
            test_refs: scan(&sources.test),
        }
    }
}

/// A default export has no name to search for, so look for files importing
/// the defining module instead.
fn importers_of(defining_file: &Path, sources: &SourceSet) -> Corroboration {
    let Some(target) = module_name(defining_file) else {
        return Corroboration::default();
    };
    let Ok(specifiers) = Regex::new(r#"(?:\bfrom|\bimport\s*\(?|\brequire\s*\()\s*['"]([^'"]+)['"]"#) else {
        return Corroboration::default();
    };

    let scan = |files: &BTreeMap<PathBuf, String>| -> Vec<PathBuf> {
        files
            .iter()
            .filter(|(path, _)| path.as_path() != defining_file)
            .filter(|(_, text)| {
                specifiers
                    .captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .any(|specifier| names_module(specifier.as_str(), target))
            })
            .map(|(path, _)| path.clone())
            .collect()
    };

    Corroboration {
        production_refs: scan(&sources.production),
        test_refs: scan(&sources.test),
    }
}

/// How an import specifier names a file: its stem, or the directory for `index` files.
fn module_name(file: &Path) -> Option<&str> {
    let stem = file.file_stem()?.to_str()?;
    if stem == "index" {
        return file.parent()?.file_name()?.to_str();
    }
    Some(stem)
}

fn names_module(specifier: &str, target: &str) -> bool {
    let mut segments = specifier.trim_end_matches('/').rsplit('/');
    let Some(last) = segments.next() else {
        return false;
    };
    let last = SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| last.strip_suffix(ext))
        .unwrap_or(last);
    if last == "index" {
        return segments.next() == Some(target);
    }
    last == target
}

/// Word boundaries that also treat `$` as part of an identifier.
fn whole_word(identifier: &str) -> Option<Regex> {
    let escaped = regex::escape(identifier);
    Regex::new(&format!(r"(?:^|[^A-Za-z0-9_$]){escaped}(?:$|[^A-Za-z0-9_$])")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> SourceSet {
        let mut set = SourceSet::new();
        set.insert(
            PathBuf::from("src/pricing.ts"),
            "export function computeDiscount(total: number) { return total * 0.1; }".to_string(),
            false,
        );
        set.insert(
            PathBuf::from("src/pricing-config.ts"),
            "export const rules = { discount: computeDiscount, tax: applyTax };".to_string(),
            false,
        );
        set.insert(
            PathBuf::from("src/labels.ts"),
            "const label = 'computeDiscountLabel'; const $send = 1;".to_string(),
            false,
        );
        set.insert(
            PathBuf::from("src/pricing.test.ts"),
            "expect(computeDiscount(10)).toBe(1); sendAll();".to_string(),
            true,
        );
        set
    }

    #[test]
    fn test_reference_in_config_object() {
        let corroborator = ReferenceCorroborator::default();
        let result = corroborator.corroborate("computeDiscount", Path::new("src/pricing.ts"), &sources());
        assert!(result.found());
        assert_eq!(result.production_refs, vec![PathBuf::from("src/pricing-config.ts")]);
        assert_eq!(result.test_refs, vec![PathBuf::from("src/pricing.test.ts")]);
    }

    #[test]
    fn test_defining_file_and_substrings_ignored() {
        let corroborator = ReferenceCorroborator::default();
        assert!(!corroborator.is_referenced("applyTaxes", Path::new("src/pricing.ts"), &sources()));
        assert!(!corroborator.is_referenced("send", Path::new("src/mail.ts"), &sources()));
        let mut only_self = SourceSet::new();
        only_self.insert(PathBuf::from("src/a.ts"), "export function lonely() { lonely(); }".to_string(), false);
        assert!(!corroborator.is_referenced("lonely", Path::new("src/a.ts"), &only_self));
    }

    #[test]
    fn test_test_references_do_not_corroborate() {
        let corroborator = ReferenceCorroborator::default();
        let result = corroborator.corroborate("sendAll", Path::new("src/mail.ts"), &sources());
        assert!(!result.found());
        assert_eq!(result.test_refs.len(), 1);
    }

    #[test]
    fn test_short_identifiers_excluded() {
        let corroborator = ReferenceCorroborator::new(4);
        let mut set = SourceSet::new();
        set.insert(PathBuf::from("src/b.ts"), "run(); get();".to_string(), false);
        assert!(!corroborator.is_referenced("run", Path::new("src/a.ts"), &set));
        assert!(ReferenceCorroborator::new(3).is_referenced("run", Path::new("src/a.ts"), &set));
    }

    #[test]
    fn test_default_exports_match_importers_not_the_keyword() {
        let corroborator = ReferenceCorroborator::default();
        let orphan = Path::new("src/orphan.ts");
        let mut set = SourceSet::new();
        set.insert(orphan.to_path_buf(), "export default function () { return 42; }".to_string(), false);
        set.insert(PathBuf::from("src/other.ts"), "const x = 1;\nexport default x;".to_string(), false);
        assert!(!corroborator.is_referenced(DEFAULT_EXPORT, orphan, &set));

        set.insert(
            PathBuf::from("src/app.ts"),
            "import answer from './orphan';\nanswer();".to_string(),
            false,
        );
        set.insert(
            PathBuf::from("src/orphan.test.ts"),
            "const answer = require('../src/orphan.ts');".to_string(),
            true,
        );
        let result = corroborator.corroborate(DEFAULT_EXPORT, orphan, &set);
        assert_eq!(result.production_refs, vec![PathBuf::from("src/app.ts")]);
        assert_eq!(result.test_refs, vec![PathBuf::from("src/orphan.test.ts")]);
    }

    #[test]
    fn test_index_default_export_matched_by_directory() {
        let corroborator = ReferenceCorroborator::default();
        let mut set = SourceSet::new();
        set.insert(PathBuf::from("src/server.ts"), "const jobs = await import('./jobs');".to_string(), false);
        assert!(corroborator.is_referenced("default", Path::new("src/jobs/index.ts"), &set));
        assert!(!corroborator.is_referenced("default", Path::new("src/mail/index.ts"), &set));
    }

    #[test]
    fn test_synthetic_names_never_corroborate() {
        let corroborator = ReferenceCorroborator::default();
        let mut set = SourceSet::new();
        set.insert(PathBuf::from("src/b.ts"), "// see <handler@12> and <module>".to_string(), false);
        assert!(!corroborator.is_referenced("<handler@12>", Path::new("src/a.ts"), &set));
        assert!(!corroborator.is_referenced("<module>", Path::new("src/a.ts"), &set));
    }

    #[test]
    fn test_method_names_use_last_segment() {
        let corroborator = ReferenceCorroborator::default();
        let mut set = SourceSet::new();
        set.insert(PathBuf::from("src/b.ts"), "service.refresh()".to_string(), false);
        assert!(corroborator.is_referenced("TokenService.refresh", Path::new("src/a.ts"), &set));
    }
}
