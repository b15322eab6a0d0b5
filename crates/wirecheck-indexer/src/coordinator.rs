//! Orchestrates repository indexing: discover, parse in parallel, extract, resolve

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use ignore::WalkBuilder;
use tracing::{debug, info, warn};
use wirecheck_core::{ParseRepository, ParsedRepository};

use crate::extractor::FileExtraction;
use crate::languages::get_extractor;
use crate::parser_pool::{FileType, ParseRequest, ParserPool, create_parser_pool};
use crate::resolver::Resolver;

/// Directories never worth walking even when no ignore file says so.
const SKIPPED_DIRECTORIES: &[&str] = &["node_modules", "dist", "build", "coverage", ".git", ".next", "out"];

/// Tree-sitter implementation of the parse capability.
#[derive(Clone)]
pub struct Coordinator {
    pool: ParserPool,
}

impl Default for Coordinator {
    fn default() -> Self {
        Coordinator::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            pool: create_parser_pool(),
        }
    }

    pub fn with_pool(pool: ParserPool) -> Self {
        Coordinator { pool }
    }

    /// Repository-relative paths of every parseable source file, sorted.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(root)
            .require_git(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIPPED_DIRECTORIES.contains(&&*name))
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(root).ok()?;
                FileType::from_path(relative).map(|_| relative.to_path_buf())
            })
            .collect();
        files.sort();
        files
    }

    /// Parse and resolve a whole working tree.
    pub fn index(&self, root: &Path) -> Result<ParsedRepository> {
        let started = Instant::now();
        let paths = self.discover(root);

        let mut sources = BTreeMap::new();
        let mut requests = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(file_type) = FileType::from_path(&path) else {
                continue;
            };
            match std::fs::read_to_string(root.join(&path)) {
                Ok(content) => {
                    sources.insert(path.clone(), content.clone());
                    requests.push(ParseRequest {
                        file_type,
                        content,
                        path,
                    });
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        let mut extractions: BTreeMap<PathBuf, FileExtraction> = BTreeMap::new();
        for result in self.pool.parse_batch(requests) {
            let parsed = match result {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Parse failed: {}", e);
                    continue;
                }
            };
            if parsed.tree.root_node().has_error() {
                debug!("{} has syntax errors, extracting what parsed", parsed.path.display());
            }
            let extraction = get_extractor(parsed.file_type).extract(&parsed.path, &parsed.tree, &parsed.content);
            extractions.insert(parsed.path, extraction);
        }

        let model = Resolver::new(extractions).into_model();
        info!(
            "Indexed {} files: {} functions, {} call edges, {} entry-point registrations in {:?}",
            model.files.len(),
            model.functions.len(),
            model.call_edges.len(),
            model.entry_points.len(),
            started.elapsed()
        );
        Ok(ParsedRepository { model, sources })
    }
}

impl ParseRepository for Coordinator {
    fn parse(&self, root: &Path) -> Result<ParsedRepository> {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
        self.index(root)
    }
}
