/// Acceptance tests for the square-sum demo pipeline
///
/// Each run materializes four steps, executes them through the binary's own
/// `invoke` second stage and prints the sum of squares.
mod common;

use common::TestWorkspace;
use predicates::prelude::*;

#[test]
fn test_square_sum_prints_total() {
    let workspace = TestWorkspace::new();

    workspace
        .galaxy()
        .args(["demo", "square-sum", "--num", "5"])
        .assert()
        .success()
        .stdout("30\n")
        .stderr(predicate::str::contains("show printed: 30"));
}

#[test]
fn test_square_sum_uploads_outputs_to_store() {
    let workspace = TestWorkspace::new();

    workspace
        .galaxy()
        .args(["demo", "square-sum", "--num", "3"])
        .assert()
        .success()
        .stdout("5\n");

    // Stored outputs land under the workflow namespace
    let objects = workspace.store_dir().join("objects/square-sum");
    assert!(objects.join("fanout").is_file());
    assert!(objects.join("square").is_file());
    assert!(objects.join("result.txt").is_file());
    assert!(objects.join("build-in/stage-two").is_dir());

    // Step working directories are kept by default
    workspace.assert_file_exists("work/fan-in/entry.sh");
}

#[test]
fn test_square_sum_rerun_is_stable() {
    let workspace = TestWorkspace::new();

    for _ in 0..2 {
        workspace
            .galaxy()
            .args(["demo", "square-sum", "--num", "4"])
            .assert()
            .success()
            .stdout("14\n");
    }
}

#[test]
fn test_square_sum_clean_removes_workdirs() {
    let workspace = TestWorkspace::new();

    workspace
        .galaxy()
        .args(["demo", "square-sum", "--num", "2", "--clean"])
        .assert()
        .success()
        .stdout("1\n");

    assert!(!workspace.work_dir().join("fan-out").exists());
}

#[test]
fn test_square_sum_reads_discovered_config() {
    let workspace = TestWorkspace::new();
    workspace.create_file(
        "galaxy.toml",
        r#"
[workflow]
name = "configured"
namespace = "runs/configured"
"#,
    );

    workspace
        .galaxy()
        .args(["demo", "square-sum", "--num", "3"])
        .assert()
        .success()
        .stdout("5\n");

    assert!(workspace
        .store_dir()
        .join("objects/runs/configured/result.txt")
        .is_file());
}

#[test]
fn test_square_sum_rejects_invalid_config() {
    let workspace = TestWorkspace::new();
    workspace.create_file("galaxy.toml", "[store]\nretries = 0\n");

    workspace
        .galaxy()
        .args(["demo", "square-sum", "--num", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("store.retries"));
}
