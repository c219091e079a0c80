//! End-to-end pipeline behavior through the CLI: success, resume,
//! best-effort tolerance, and fatal short-circuit.

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) {
    fs::write(dir.path().join("isoforge.toml"), content).unwrap();
}

fn isoforge_in(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("isoforge").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

fn checkpoints(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join(".isoforge/checkpoints.json")).unwrap()
}

#[test]
fn two_phase_plan_succeeds_and_records_checkpoints() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "bootstrap"

[[phase.item]]
id = "rootdir"
program = "sh"
args = ["-c", "mkdir -p rootfs"]

[[phase]]
id = "rootfs"
depends_on = ["bootstrap"]

[[phase.item]]
id = "populate"
program = "sh"
args = ["-c", "touch rootfs/etc-stub"]
"#,
    );

    isoforge_in(&dir)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("pipeline complete"));

    assert!(dir.path().join("rootfs/etc-stub").exists());
    let recorded = checkpoints(&dir);
    assert!(recorded.contains("\"bootstrap\""));
    assert!(recorded.contains("\"succeeded\""));
}

#[test]
fn fatal_item_exits_two_and_leaves_later_phases_unrecorded() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "packages"

[[phase.item]]
id = "broken"
program = "sh"
args = ["-c", "echo install blew up >&2; exit 7"]

[[phase]]
id = "iso"
depends_on = ["packages"]

[[phase.item]]
id = "never"
program = "sh"
args = ["-c", "touch never.touch"]
"#,
    );

    isoforge_in(&dir)
        .arg("build")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("packages/broken"));

    // The failing phase is checkpointed; phases after it were never started.
    let recorded = checkpoints(&dir);
    assert!(recorded.contains("\"failed\""));
    assert!(recorded.contains("exit code 7"));
    assert!(!recorded.contains("\"iso\""));
    assert!(!dir.path().join("never.touch").exists());
}

#[test]
fn resume_skips_phases_that_already_completed() {
    let dir = TempDir::new().unwrap();
    // The bootstrap item fails if it ever runs a second time.
    write_config(
        &dir,
        r#"
[[phase]]
id = "bootstrap"

[[phase.item]]
id = "once"
program = "sh"
args = ["-c", "test ! -e bootstrap.ran && touch bootstrap.ran"]

[[phase]]
id = "packages"
depends_on = ["bootstrap"]

[[phase.item]]
id = "broken"
program = "sh"
args = ["-c", "exit 1"]
"#,
    );

    isoforge_in(&dir).arg("build").assert().code(2);
    assert!(dir.path().join("bootstrap.ran").exists());

    // Second invocation resumes at the failed phase; had bootstrap re-run,
    // its guard would have failed it and the checkpoint would say so.
    isoforge_in(&dir).arg("build").assert().code(2);
    let recorded = checkpoints(&dir);
    assert!(recorded.contains("\"bootstrap\""));
    assert!(recorded.contains("\"succeeded\""));
    assert!(recorded.contains("broken: exit code 1"));
}

#[test]
fn clean_flag_restarts_from_the_first_phase() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "bootstrap"

[[phase.item]]
id = "count"
program = "sh"
args = ["-c", "echo x >> runs.count"]
"#,
    );

    isoforge_in(&dir).arg("build").assert().success();
    isoforge_in(&dir).args(["build", "--clean"]).assert().success();

    let runs = fs::read_to_string(dir.path().join("runs.count")).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[test]
fn exhausted_best_effort_item_is_tolerated_and_pipeline_succeeds() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "extras"

[[phase.item]]
id = "first"
program = "sh"
args = ["-c", "touch first.touch"]

[[phase.item]]
id = "flaky"
program = "sh"
args = ["-c", "echo x >> flaky.attempts; exit 1"]
best_effort = true
max_retries = 2

[[phase.item]]
id = "last"
program = "sh"
args = ["-c", "touch last.touch"]

[[phase]]
id = "iso"
depends_on = ["extras"]

[[phase.item]]
id = "pack"
program = "sh"
args = ["-c", "touch iso.touch"]
"#,
    );

    isoforge_in(&dir)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("partially succeeded"));

    // All three items ran; the flaky one used its full retry budget.
    assert!(dir.path().join("first.touch").exists());
    assert!(dir.path().join("last.touch").exists());
    assert!(dir.path().join("iso.touch").exists());
    let attempts = fs::read_to_string(dir.path().join("flaky.attempts")).unwrap();
    assert_eq!(attempts.lines().count(), 3);

    let recorded = checkpoints(&dir);
    assert!(recorded.contains("\"partially_succeeded\""));
    assert!(recorded.contains("\"flaky\""));
}

#[test]
fn policy_table_tolerates_an_unflagged_item() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "extras"

[[phase.item]]
id = "fonts"
program = "sh"
args = ["-c", "exit 1"]

[policy]
extras = ["fonts"]
"#,
    );

    isoforge_in(&dir).arg("build").assert().success();
    let recorded = checkpoints(&dir);
    assert!(recorded.contains("\"partially_succeeded\""));
}

#[test]
fn run_log_captures_item_output_and_markers() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
[[phase]]
id = "bootstrap"

[[phase.item]]
id = "hello"
program = "sh"
args = ["-c", "echo hello-from-item"]
"#,
    );

    isoforge_in(&dir).arg("build").assert().success();

    let logs_dir = dir.path().join(".isoforge/logs");
    let log_path = first_log(&logs_dir);
    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("===== phase bootstrap"));
    assert!(log.contains("[hello] hello-from-item"));
    assert!(log.contains("exit code 0"));
}

fn first_log(logs_dir: &Path) -> std::path::PathBuf {
    fs::read_dir(logs_dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext == "log"))
        .expect("a run log should exist")
}
