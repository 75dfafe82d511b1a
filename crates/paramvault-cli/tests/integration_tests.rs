use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn pvault() -> Command {
    Command::cargo_bin("pvault").unwrap()
}

fn run_demo(dir: &Path, extra: &[&str]) {
    pvault()
        .arg("demo")
        .arg(dir)
        .args(["--epochs", "12", "--save-every", "4"])
        .args(extra)
        .assert()
        .success();
}

#[test]
fn test_cli_help() {
    pvault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Durable checkpoints for model parameters"));
}

#[test]
fn test_cli_demo_restores_trained_model() {
    let dir = tempdir().unwrap();
    pvault()
        .arg("demo")
        .arg(dir.path())
        .args(["--epochs", "10", "--save-every", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Untrained accuracy"))
        .stdout(predicate::str::contains("Restored accuracy"))
        .stdout(predicate::str::contains("cp-0010"));
}

#[test]
fn test_cli_list_marks_latest() {
    let dir = tempdir().unwrap();
    run_demo(dir.path(), &["--keep", "2"]);

    // Saves at 1, 5, 9 plus the final epoch 12; two are retained
    pvault()
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("cp-0009"))
        .stdout(predicate::str::contains("cp-0012  "))
        .stdout(predicate::str::contains("(latest)"))
        .stdout(predicate::str::contains("cp-0005").not())
        .stdout(predicate::str::contains("2 snapshot(s)"));
}

#[test]
fn test_cli_list_empty_store() {
    let dir = tempdir().unwrap();
    pvault()
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshots"));
}

#[test]
fn test_cli_inspect() {
    let dir = tempdir().unwrap();
    run_demo(dir.path(), &[]);

    pvault()
        .arg("inspect")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot:   cp-0012"))
        .stdout(predicate::str::contains("linear.weight"))
        .stdout(predicate::str::contains("[4, 3]"));

    pvault()
        .arg("inspect")
        .arg(dir.path())
        .arg("missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Snapshot not found"));
}

#[test]
fn test_cli_verify_detects_corruption() {
    let dir = tempdir().unwrap();
    run_demo(dir.path(), &[]);

    pvault()
        .arg("verify")
        .arg(dir.path())
        .arg("--all")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK      cp-0001"));

    let blob = dir.path().join("blobs").join("cp-0005.00000002.000.safetensors");
    let mut bytes = fs::read(&blob).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&blob, bytes).unwrap();

    pvault()
        .arg("verify")
        .arg(dir.path())
        .arg("cp-0005")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED  cp-0005"));

    pvault()
        .arg("verify")
        .arg(dir.path())
        .assert()
        .success();
}

#[test]
fn test_cli_delete_and_prune() {
    let dir = tempdir().unwrap();
    run_demo(dir.path(), &[]);

    pvault()
        .arg("delete")
        .arg(dir.path())
        .arg("cp-0001")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted cp-0001"));

    pvault()
        .arg("delete")
        .arg(dir.path())
        .arg("cp-0001")
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshot named cp-0001"));

    pvault()
        .arg("prune")
        .arg(dir.path())
        .args(["--keep", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 2 snapshot(s)"))
        .stdout(predicate::str::contains("cp-0005"));

    pvault()
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 snapshot(s)"));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("store.json");
    fs::write(&config, r#"{ "retention": { "max_kept": 0 } }"#).unwrap();

    pvault()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg(dir.path().join("store"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_kept"));
}

#[test]
fn test_cli_demo_rejects_zero_epochs() {
    let dir = tempdir().unwrap();
    pvault()
        .arg("demo")
        .arg(dir.path())
        .args(["--epochs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--epochs"));
    assert!(!dir.path().join("index.json").exists());
}

#[test]
fn test_cli_rust_log_overrides_default_level() {
    let dir = tempdir().unwrap();

    pvault()
        .arg("list")
        .arg(dir.path())
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(predicate::str::contains("Opened checkpoint store"));

    pvault()
        .arg("list")
        .arg(dir.path())
        .env("RUST_LOG", "warn")
        .assert()
        .success()
        .stderr(predicate::str::contains("Opened checkpoint store").not());
}
