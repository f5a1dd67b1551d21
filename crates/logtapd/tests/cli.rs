use assert_cmd::Command;
use predicates::prelude::*;

fn logtapd() -> Command {
    let mut cmd = Command::cargo_bin("logtapd").unwrap();
    for var in [
        "CONTAINER_NAMES",
        "LOG_DIR",
        "POLL_INTERVAL",
        "HEARTBEAT_INTERVAL",
        "BACKOFF",
        "BACKOFF_MAX",
        "SHUTDOWN_TIMEOUT",
        "LOGTAP_CONFIG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_options() {
    logtapd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--containers"))
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("CONTAINER_NAMES"));
}

#[test]
fn test_refuses_to_start_without_containers() {
    let dir = tempfile::TempDir::new().unwrap();
    logtapd()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No containers configured"));
}

#[test]
fn test_rejects_invalid_container_name() {
    let dir = tempfile::TempDir::new().unwrap();
    logtapd()
        .current_dir(dir.path())
        .args(["--containers", "web,../../etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid container name"));
}

#[test]
fn test_rejects_zero_poll_interval() {
    let dir = tempfile::TempDir::new().unwrap();
    logtapd()
        .current_dir(dir.path())
        .args(["--containers", "web", "--poll-interval", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Poll interval"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    logtapd()
        .current_dir(dir.path())
        .args(["--config", "absent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
