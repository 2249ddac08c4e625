use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn wsimple() -> Command {
    let mut cmd = Command::cargo_bin("wsimple-sync").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn short_version_flag_prints_one_line() {
    let output = wsimple().arg("-V").assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(
        stdout,
        format!("wsimple-sync {}\n", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn help_documents_replay_and_config() {
    wsimple()
        .arg("-h")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Usage: wsimple-sync [--config PATH] replay SCRIPT.yaml")
                .and(predicate::str::contains("--config PATH"))
                .and(predicate::str::contains("(default ")),
        );
}

#[test]
fn help_flag_skips_the_replay() {
    wsimple()
        .args(["replay", "absent.yaml", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\"").not())
        .stderr(predicate::str::is_empty());
}

#[test]
fn no_arguments_points_at_replay() {
    wsimple()
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected `replay SCRIPT.yaml`"));
}

#[test]
fn config_flag_requires_a_path() {
    wsimple()
        .arg("--config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config needs a path"));
}

#[test]
fn nan_end_threshold_from_env_fails_before_replay() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.yaml"), "{}\n").unwrap();
    fs::write(dir.path().join("session.yaml"), "events: []\n").unwrap();
    wsimple()
        .env("WSIMPLE_FEED__END_THRESHOLD_PX", "NaN")
        .arg("--config")
        .arg(dir.path().join("config.yaml"))
        .arg("replay")
        .arg(dir.path().join("session.yaml"))
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("WSIMPLE_FEED__END_THRESHOLD_PX"));
}
