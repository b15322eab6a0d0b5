//! Integration tests for Wirecheck
//!
//! These tests drive the CLI and the library crates together against real
//! on-disk trees.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use tempfile::TempDir;
use wirecheck_core::test_utils::create_test_repo;
use wirecheck_core::{GraphReader, RepoId, Settings, SnapshotStore};
use wirecheck_indexer::Coordinator;
use wirecheck_pipeline::{LocalSource, Remapper};

fn wirecheck(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wirecheck"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute wirecheck")
}

/// The widget service without its pricing module.
fn main_branch() -> TempDir {
    let tree = create_test_repo();
    for file in ["src/pricing.ts", "src/pricing-config.ts", "src/pricing.test.ts"] {
        std::fs::remove_file(tree.path().join(file)).unwrap();
    }
    tree
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirecheck"))
        .arg("--help")
        .output()
        .expect("Failed to execute wirecheck");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for command in ["map", "check", "unreachable", "watch", "serve"] {
        assert!(stdout.contains(command), "missing {command} in help:\n{stdout}");
    }
}

#[test]
fn test_map_then_check_blocks_on_dead_export() {
    let main = main_branch();
    let candidate = create_test_repo();

    let mapped = wirecheck(main.path(), &["map", "--repo", "acme/widgets", "--revision", "main-1"]);
    assert!(mapped.status.success(), "{}", String::from_utf8_lossy(&mapped.stderr));
    assert!(main.path().join(".wirecheck/store").is_dir());

    let checked = wirecheck(
        main.path(),
        &[
            "check",
            "--repo",
            "acme/widgets",
            "--candidate",
            candidate.path().to_str().unwrap(),
            "--revision",
            "pr-1",
        ],
    );
    assert_eq!(checked.status.code(), Some(1));

    let report = stdout_json(&checked);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["conclusion"], "fail");
    assert_eq!(report["new_exports"], 2);
    assert_eq!(report["counts"]["likely_reachable"], 1);
    assert_eq!(report["counts"]["unreachable"], 1);
}

#[test]
fn test_check_passes_when_nothing_new_is_exported() {
    let main = main_branch();
    let mapped = wirecheck(main.path(), &["map", "--repo", "acme/widgets"]);
    assert!(mapped.status.success(), "{}", String::from_utf8_lossy(&mapped.stderr));

    let candidate = main_branch();
    let checked = wirecheck(
        main.path(),
        &["check", "--repo", "acme/widgets", "--candidate", candidate.path().to_str().unwrap()],
    );
    assert!(checked.status.success(), "{}", String::from_utf8_lossy(&checked.stderr));

    let report = stdout_json(&checked);
    assert_eq!(report["conclusion"], "pass");
    assert_eq!(report["new_exports"], 0);
}

#[test]
fn test_unreachable_report_lists_dead_module() {
    let tree = create_test_repo();
    let mapped = wirecheck(tree.path(), &["map", "--repo", "acme/widgets"]);
    assert!(mapped.status.success(), "{}", String::from_utf8_lossy(&mapped.stderr));

    let output = wirecheck(tree.path(), &["unreachable", "--repo", "acme/widgets", "--module", "src/"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let reports = stdout_json(&output);
    let modules: Vec<&str> = reports
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["module"].as_str().unwrap())
        .collect();
    assert_eq!(modules, vec!["src/pricing.ts"]);
    assert_eq!(reports[0]["functions"].as_array().unwrap().len(), 2);
}

#[test]
fn test_unmapped_repository_is_an_error() {
    let tree = create_test_repo();
    let output = wirecheck(tree.path(), &["unreachable", "--repo", "acme/unknown"]);
    assert!(!output.status.success());
}

/// Snapshots written by one store are served by the next one opened on the
/// same directory.
#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let repo = RepoId::new("acme/widgets");
    let tree = create_test_repo();
    let store_dir = TempDir::new().unwrap();

    {
        let store = Arc::new(SnapshotStore::open(store_dir.path()).unwrap());
        let remapper = Remapper::new(
            store,
            Arc::new(LocalSource::single(repo.clone(), tree.path())),
            Arc::new(Coordinator::new()),
            &Settings::default(),
        );
        remapper.remap(&repo, "main-1").await.unwrap();
    }

    let reopened = SnapshotStore::open(store_dir.path()).unwrap();
    assert_eq!(reopened.repositories(), vec![repo.clone()]);
    let snapshot = reopened.require_snapshot(&repo).await.unwrap();
    assert_eq!(snapshot.revision, "main-1");
    assert_eq!(snapshot.graph.file_count(), 6);

    let entries = reopened.query_entry_points(&repo).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].qualified_name, "createWidget");
}
