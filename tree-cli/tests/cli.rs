#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use std::path::Path;
use tempfile::TempDir;

fn tree_cli(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tree-cli").unwrap();
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

fn init(data_dir: &Path) {
    tree_cli(data_dir)
        .args(["init", "--user", "alice", "--name", "Alice", "--bucket", "alice-bucket"])
        .assert()
        .success()
        .stdout(contains("Treesystem initialized successfully!"))
        .stdout(contains("/home"));
}

#[test]
fn commands_require_init() {
    let temp = TempDir::new().unwrap();

    tree_cli(temp.path())
        .args(["ls"])
        .assert()
        .failure()
        .stderr(contains("tree-cli init"));

    tree_cli(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("NOT INITIALIZED"));
}

#[test]
fn init_twice_fails() {
    let temp = TempDir::new().unwrap();
    init(temp.path());

    tree_cli(temp.path())
        .args(["init", "--user", "bob", "--name", "Bob", "--bucket", "b"])
        .assert()
        .failure()
        .stderr(contains("already initialized"));
}

#[test]
fn add_list_and_resolve() {
    let temp = TempDir::new().unwrap();
    init(temp.path());

    tree_cli(temp.path())
        .args(["add", "/home/Docs"])
        .assert()
        .success();
    tree_cli(temp.path())
        .args(["add", "/home/Docs/Report.pdf"])
        .assert()
        .success()
        .stdout(contains("Added /home/Docs/Report.pdf"));
    tree_cli(temp.path())
        .args(["add", "/home/Docs/report.pdf"])
        .assert()
        .success()
        .stdout(contains("Added /home/Docs/report 2.pdf"))
        .stdout(contains("renamed"));

    tree_cli(temp.path())
        .args(["ls", "/home", "--recursive"])
        .assert()
        .success()
        .stdout(contains("  Docs  [local]"))
        .stdout(contains("    Report.pdf  [local]"))
        .stdout(contains("    report 2.pdf  [local]"));

    tree_cli(temp.path())
        .args(["resolve", "/home/Docs/Report.pdf"])
        .assert()
        .success()
        .stdout(contains("us-west-2/alice-bucket"))
        .stdout(contains("(not uploaded)"));
}

#[test]
fn push_then_remove() {
    let temp = TempDir::new().unwrap();
    init(temp.path());

    tree_cli(temp.path())
        .args(["add", "/home/Docs"])
        .assert()
        .success();
    tree_cli(temp.path())
        .arg("push")
        .assert()
        .success()
        .stdout(contains("Queued 1 upload(s) and 0 delete(s)"))
        .stdout(contains("Completed:  1"));

    tree_cli(temp.path())
        .args(["ls", "/home"])
        .assert()
        .success()
        .stdout(contains("Docs  [uploaded]"));

    tree_cli(temp.path())
        .args(["rm", "/home/Docs"])
        .assert()
        .success()
        .stdout(contains("1 server delete(s) pending"));

    tree_cli(temp.path())
        .arg("push")
        .assert()
        .success()
        .stdout(contains("Queued 0 upload(s) and 1 delete(s)"));

    tree_cli(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Pending deletes: 0"));
}

#[test]
fn push_reports_escalation() {
    let temp = TempDir::new().unwrap();
    init(temp.path());

    tree_cli(temp.path())
        .args(["add", "/home/Docs"])
        .assert()
        .success();
    tree_cli(temp.path())
        .args(["push", "--reject", "3"])
        .assert()
        .success()
        .stdout(contains("Escalated:  1"))
        .stdout(contains("too many processing failures"));
}

#[test]
fn config_file_overrides_defaults() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("custom.toml");
    std::fs::write(&config_path, "[push.retry]\nmax_processing_failures = 1\n").unwrap();

    tree_cli(temp.path())
        .arg("--config")
        .arg(&config_path)
        .args(["init", "--user", "alice", "--name", "Alice", "--bucket", "b"])
        .assert()
        .success();
    tree_cli(temp.path())
        .args(["add", "/home/Docs"])
        .assert()
        .success();
    tree_cli(temp.path())
        .arg("--config")
        .arg(&config_path)
        .args(["push", "--reject", "1"])
        .assert()
        .success()
        .stdout(contains("Escalated:  1"));
}

#[test]
fn malformed_config_is_reported() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("tree.toml"), "[push\n").unwrap();

    tree_cli(temp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("failed to parse config file"));
}
