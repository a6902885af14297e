// ABOUTME: Integration tests for the fleetflip CLI commands.
// ABOUTME: Runs the binary against the in-memory backend with state in a temp dir.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PROJECT_CONFIG: &str = r#"
service: shop
fleets:
  blue: { desired: 2, min: 1, max: 4 }
  green: { desired: 0, min: 0, max: 0 }
target_groups:
  - role: frontend
  - role: api
    paths: ["/api/*"]
    priority: 10
convergence:
  poll_interval: 1s
  timeout: 30s
stabilization: 0s
backend:
  kind: memory
"#;

fn fleetflip_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("fleetflip"))
}

/// A project directory with a config and its own state directory.
fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("fleetflip.yml"), PROJECT_CONFIG).unwrap();
    dir
}

fn in_project(dir: &Path) -> Command {
    let mut cmd = fleetflip_cmd();
    cmd.current_dir(dir)
        .env("FLEETFLIP_STATE_DIR", dir.join("state"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_shows_commands() {
    fleetflip_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("flip"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("fleetflip.yml");

    fleetflip_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "checkout"])
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("service: checkout"));
    assert!(content.contains("target_groups:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("fleetflip.yml"), "existing: config").unwrap();

    fleetflip_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();

    fleetflip_cmd()
        .current_dir(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn status_reports_the_initial_state() {
    let dir = project();

    in_project(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Active:  blue"))
        .stdout(predicate::str::contains("stable (blue)"));
}

#[test]
fn json_status_is_machine_readable() {
    let dir = project();

    let output = in_project(dir.path())
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["service"], "shop");
    assert_eq!(report["state"]["active_color"], "blue");
    assert_eq!(report["ready_to_flip"], false);
}

#[test]
fn flip_from_stable_is_rejected() {
    let dir = project();

    in_project(dir.path())
        .arg("flip")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    assert!(!dir.path().join("state").join("shop.state.json").exists());
}

#[test]
fn canary_rejects_bad_weights() {
    let dir = project();

    fleetflip_cmd()
        .current_dir(dir.path())
        .args(["canary", "blue=50,red=50"])
        .assert()
        .failure();
}

#[test]
fn deploy_runs_to_completion() {
    let dir = project();

    in_project(dir.path())
        .args([
            "deploy",
            "--release",
            "v2",
            "--canary",
            "10,50",
            "--drain",
            "0s",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment complete!"))
        .stdout(predicate::str::contains("Active:  green"))
        .stdout(predicate::str::contains("Release: v2"));

    in_project(dir.path())
        .args(["history", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retire"));

    let lock = dir.path().join("state").join("shop.lock");
    assert!(!lock.exists());
}

#[test]
fn deploy_is_refused_while_locked() {
    let dir = project();
    let state = dir.path().join("state");
    fs::create_dir_all(&state).unwrap();
    fs::write(
        state.join("shop.lock"),
        format!(
            r#"{{"holder":"ci-runner","pid":1,"started_at":"{}","service":"shop"}}"#,
            chrono::Utc::now().to_rfc3339()
        ),
    )
    .unwrap();

    in_project(dir.path())
        .args(["deploy", "--drain", "0s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ci-runner"));
}
