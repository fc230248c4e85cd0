//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to get CLI command rooted at `root`
fn cli(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tenant-index").unwrap();
    cmd.env_remove("TENANT_INDEX_ROOT")
        .env_remove("RELEVANCE_THRESHOLD")
        .arg("--root")
        .arg(root)
        .arg("--no-sync");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn insert(root: &Path, namespace: &str, doc: &str, records: &str) -> serde_json::Value {
    let input = root.join(format!("{namespace}-{doc}.json"));
    fs::write(&input, records).unwrap();
    stdout_json(cli(root).args([
        "insert",
        "--namespace",
        namespace,
        "--doc",
        doc,
        "--input",
        input.to_str().unwrap(),
    ]))
}

const DOC_A: &str = r#"[
    {"chunkId": "a-0", "order": 0, "vector": [1.0, 0.0]},
    {"chunkId": "a-1", "order": 1, "vector": [0.0, 1.0]}
]"#;

const DOC_B: &str = r#"[{"chunkId": "b-0", "order": 0, "vector": [0.6, 0.8]}]"#;

// ============================================================================
// INFO COMMAND TESTS
// ============================================================================

#[test]
fn test_info_shows_version_and_root() {
    let tmp = TempDir::new().unwrap();
    cli(tmp.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tenant-Index"))
        .stdout(predicate::str::contains("Version:"))
        .stdout(predicate::str::contains(tmp.path().to_str().unwrap()));
}

// ============================================================================
// INSERT / SEARCH TESTS
// ============================================================================

#[test]
fn test_insert_returns_sequential_ids() {
    let tmp = TempDir::new().unwrap();
    assert_eq!(insert(tmp.path(), "t", "A", DOC_A)["ids"], serde_json::json!([1, 2]));
    assert_eq!(insert(tmp.path(), "t", "B", DOC_B)["ids"], serde_json::json!([3]));
    assert!(tmp.path().join("t").join("meta.json").exists());
}

#[test]
fn test_insert_from_stdin() {
    let tmp = TempDir::new().unwrap();
    let out = stdout_json(
        cli(tmp.path())
            .args(["insert", "--namespace", "t", "--doc", "B"])
            .write_stdin(DOC_B),
    );
    assert_eq!(out["ids"], serde_json::json!([1]));
}

#[test]
fn test_insert_dimension_mismatch_fails() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);

    let input = tmp.path().join("bad.json");
    fs::write(&input, r#"[{"chunkId": "x", "vector": [1.0, 0.0, 0.0]}]"#).unwrap();
    cli(tmp.path())
        .args(["insert", "-n", "t", "-d", "X", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dimension mismatch"));
}

#[test]
fn test_insert_rejects_malformed_input() {
    let tmp = TempDir::new().unwrap();
    cli(tmp.path())
        .args(["insert", "-n", "t", "-d", "A"])
        .write_stdin("{not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON array"));
}

#[test]
fn test_search_orders_hits() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);
    insert(tmp.path(), "t", "B", DOC_B);

    let hits = stdout_json(cli(tmp.path()).args([
        "search",
        "--namespace",
        "t",
        "--query",
        "[0.0, 1.0]",
        "--top-k",
        "2",
    ]));
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["meta"]["chunkId"], "a-1");
    assert_eq!(hits[1]["meta"]["chunkId"], "b-0");
}

#[test]
fn test_search_absent_namespace_is_empty() {
    let tmp = TempDir::new().unwrap();
    let hits = stdout_json(cli(tmp.path()).args(["search", "-n", "ghost", "-q", "[1.0]"]));
    assert_eq!(hits, serde_json::json!([]));
}

#[test]
fn test_invalid_namespace_fails() {
    let tmp = TempDir::new().unwrap();
    cli(tmp.path())
        .args(["stats", "--namespace", "../escape"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid namespace"));
}

// ============================================================================
// RETRIEVE TESTS
// ============================================================================

#[test]
fn test_retrieve_filters_by_threshold() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);

    // [1, 0] scores 1.0 (similarity 1.0) and 0.0 (similarity 0.5)
    let out = stdout_json(cli(tmp.path()).args([
        "retrieve",
        "-n",
        "t",
        "-q",
        "[1.0, 0.0]",
        "--threshold",
        "0.6",
    ]));
    let results = out["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunkId"], "a-0");
    assert_eq!(out["confidence"], serde_json::json!(1.0));
}

#[test]
fn test_retrieve_threshold_from_env() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);

    let out = stdout_json(
        cli(tmp.path())
            .env("RELEVANCE_THRESHOLD", "0.4")
            .args(["retrieve", "-n", "t", "-q", "[1.0, 0.0]"]),
    );
    assert_eq!(out["results"].as_array().unwrap().len(), 2);
    assert_eq!(out["confidence"], serde_json::json!(0.75));
}

#[test]
fn test_retrieve_nothing_relevant() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);

    let out = stdout_json(cli(tmp.path()).args([
        "retrieve",
        "-n",
        "t",
        "-q",
        "[-1.0, -1.0]",
        "--threshold",
        "0.9",
    ]));
    assert_eq!(out["results"], serde_json::json!([]));
    assert_eq!(out["confidence"], serde_json::json!(0.0));
}

#[test]
fn test_retrieve_rejects_threshold_outside_unit_interval() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);

    cli(tmp.path())
        .args(["retrieve", "-n", "t", "-q", "[1.0, 0.0]", "--threshold", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("(0, 1]"));

    // The raw transform accepts any finite cutoff.
    let out = stdout_json(cli(tmp.path()).args([
        "retrieve",
        "-n",
        "t",
        "-q",
        "[1.0, 0.0]",
        "--transform",
        "raw",
        "--threshold=-0.5",
    ]));
    assert_eq!(out["results"].as_array().unwrap().len(), 2);
}

// ============================================================================
// DELETE / CLEAR / STATS TESTS
// ============================================================================

#[test]
fn test_delete_compacts_namespace() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);
    insert(tmp.path(), "t", "B", DOC_B);

    let out = stdout_json(cli(tmp.path()).args(["delete", "-n", "t", "-d", "A"]));
    assert_eq!(out["removed"], 2);

    let stats = stdout_json(cli(tmp.path()).args(["stats", "-n", "t"]));
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["nextId"], 2);
    assert_eq!(stats["dimension"], 2);

    let docs = stdout_json(cli(tmp.path()).args(["documents", "-n", "t", "-d", "B"]));
    assert_eq!(docs[0]["id"], 1);
    assert_eq!(docs[0]["chunkId"], "b-0");
}

#[test]
fn test_delete_unknown_document_removes_nothing() {
    let tmp = TempDir::new().unwrap();
    insert(tmp.path(), "t", "A", DOC_A);
    let meta_before = fs::read(tmp.path().join("t").join("meta.json")).unwrap();

    let out = stdout_json(cli(tmp.path()).args(["delete", "-n", "t", "-d", "missing"]));
    assert_eq!(out["removed"], 0);
    assert_eq!(fs::read(tmp.path().join("t").join("meta.json")).unwrap(), meta_before);
}

#[test]
fn test_clear_namespace() {
    let tmp = TempDir::new().unwrap();
    let out = stdout_json(cli(tmp.path()).args(["clear", "-n", "t"]));
    assert_eq!(out["cleared"], false);

    insert(tmp.path(), "t", "A", DOC_A);
    let out = stdout_json(cli(tmp.path()).args(["clear", "-n", "t"]));
    assert_eq!(out["cleared"], true);

    let stats = stdout_json(cli(tmp.path()).args(["stats", "-n", "t"]));
    assert_eq!(stats["entries"], 0);
    assert_eq!(stats["nextId"], 1);
    assert!(stats["dimension"].is_null());
}

#[test]
fn test_zstd_compression_round_trip() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("a.json");
    fs::write(&input, DOC_A).unwrap();
    cli(tmp.path())
        .args(["--compression", "zstd", "insert", "-n", "t", "-d", "A", "-i"])
        .arg(&input)
        .assert()
        .success();

    // Artifacts are self-describing, so a reader with the default codec works.
    let stats = stdout_json(cli(tmp.path()).args(["stats", "-n", "t"]));
    assert_eq!(stats["entries"], 2);
}
