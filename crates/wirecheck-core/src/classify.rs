//! Test versus production file classification

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

const TEST_DIRECTORIES: &[&str] = &["__tests__", "__mocks__", "test", "tests", "fixtures", "__fixtures__"];
const TEST_STEM_SUFFIXES: &[&str] = &[".test", ".spec", "_test", "_spec", ".stories", ".story"];

/// Pure path heuristic: does this path look like test, fixture, mock or story code?
///
/// Total over any input; anything that does not match is production.
pub fn is_test(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let Some((file_name, directories)) = segments.split_last() else {
        return false;
    };

    if directories.iter().any(|dir| TEST_DIRECTORIES.contains(dir)) {
        return true;
    }

    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    TEST_STEM_SUFFIXES
        .iter()
        .any(|suffix| stem.len() > suffix.len() && stem.ends_with(suffix))
}

/// `is_test` plus per-repository overrides from the policy document.
#[derive(Debug, Clone, Default)]
pub struct FileClassifier {
    force_production: Option<GlobSet>,
    force_test: Option<GlobSet>,
}

impl FileClassifier {
    pub fn new(not_test: &[String], test: &[String]) -> Self {
        FileClassifier {
            force_production: build_globset(not_test),
            force_test: build_globset(test),
        }
    }

    pub fn is_test(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        if self.force_production.as_ref().is_some_and(|set| set.is_match(path)) {
            return false;
        }
        if self.force_test.as_ref().is_some_and(|set| set.is_match(path)) {
            return true;
        }
        is_test(&text)
    }
}

/// Compile path patterns. A bare directory such as `src/testing` also matches
/// everything beneath it. Invalid patterns are skipped with a warning.
pub(crate) fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let trimmed = pattern.trim().trim_start_matches("./").trim_end_matches('/');
        for candidate in [trimmed.to_string(), format!("{trimmed}/**")] {
            match Glob::new(&candidate) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!("Ignoring invalid path pattern '{}': {}", pattern, e),
            }
        }
    }
    match builder.build() {
        Ok(set) => Some(set),
        Err(e) => {
            warn!("Failed to compile path patterns: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_suffixes() {
        assert!(is_test("src/widgets.test.ts"));
        assert!(is_test("src/widgets.spec.tsx"));
        assert!(is_test("lib/parser_test.js"));
        assert!(is_test("src/Button.stories.tsx"));
        assert!(!is_test("src/widgets.ts"));
        assert!(!is_test("src/testing-utils.ts"));
        assert!(!is_test("src/contest.ts"));
    }

    #[test]
    fn test_directories() {
        assert!(is_test("src/__tests__/widgets.ts"));
        assert!(is_test("src/__mocks__/db.ts"));
        assert!(is_test("test/setup.ts"));
        assert!(is_test("packages/api/tests/helpers.ts"));
        assert!(is_test("src/fixtures/users.ts"));
        assert!(!is_test("src/attestation/verify.ts"));
        assert!(!is_test("tests.ts"));
    }

    #[test]
    fn test_total_over_odd_input() {
        assert!(!is_test(""));
        assert!(!is_test("/"));
        assert!(!is_test(".test"));
        assert!(is_test("src\\__tests__\\a.ts"));
    }

    #[test]
    fn test_overrides() {
        let classifier = FileClassifier::new(
            &["src/fixtures/seed.ts".to_string()],
            &["src/dev".to_string()],
        );
        assert!(!classifier.is_test(Path::new("src/fixtures/seed.ts")));
        assert!(classifier.is_test(Path::new("src/fixtures/other.ts")));
        assert!(classifier.is_test(Path::new("src/dev/playground.ts")));
        assert!(!classifier.is_test(Path::new("src/app.ts")));
    }
}
