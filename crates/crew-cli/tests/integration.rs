#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn crew(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("crew").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("CREW_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("crew.yaml"), yaml).unwrap();
}

fn local_config(dir: &TempDir) {
    write_config(
        dir,
        &format!(
            "targets:\n  local:\n    type: local\n    workdir: {}\nexec:\n  poll_interval_ms: 20\n",
            dir.path().display()
        ),
    );
}

// ---------------------------------------------------------------------------
// crew config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_starter_once() {
    let dir = TempDir::new().unwrap();
    crew(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(dir.path().join("crew.yaml").exists());

    std::fs::write(dir.path().join("crew.yaml"), "version: 1\n").unwrap();
    crew(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("crew.yaml")).unwrap(),
        "version: 1\n"
    );
}

#[test]
fn config_check_lists_targets() {
    let dir = TempDir::new().unwrap();
    crew(&dir).args(["config", "init"]).assert().success();
    crew(&dir)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"))
        .stdout(predicate::str::contains("TARGET"))
        .stdout(predicate::str::contains("127.0.0.1"));
}

#[test]
fn config_check_fails_on_errors() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "remote:\n  root: relative/dir\ntargets:\n  local:\n    type: local\n");
    crew(&dir)
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_check_json_reports_warnings() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "version: 1\n");
    let out = crew(&dir)
        .args(["--json", "config", "check"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
}

#[test]
fn explicit_config_path_from_env() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("elsewhere.yaml");
    std::fs::write(&path, "targets:\n  box:\n    type: ssh\n    host: 10.1.2.3\n").unwrap();
    crew(&dir)
        .env("CREW_CONFIG", &path)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.1.2.3"));
}

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    crew(&dir)
        .args(["--config", "nope.yaml", "config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}

// ---------------------------------------------------------------------------
// crew cron
// ---------------------------------------------------------------------------

#[test]
fn cron_check_accepts_valid_schedule() {
    let dir = TempDir::new().unwrap();
    crew(&dir)
        .args(["cron", "check", "*/5 1,2 1-15 * *"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn cron_check_rejects_bad_schedule() {
    let dir = TempDir::new().unwrap();
    crew(&dir)
        .args(["cron", "check", "@daily"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid cron schedule"));
    crew(&dir)
        .args(["cron", "check", "* * * *"])
        .assert()
        .failure();
}

#[test]
fn cron_line_includes_name_comment() {
    let dir = TempDir::new().unwrap();
    crew(&dir)
        .args(["cron", "line", "0 3 * * *", "backup.sh", "--name", "nightly's backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# name: nightlys backup"))
        .stdout(predicate::str::contains("0 3 * * * backup.sh"));
}

// ---------------------------------------------------------------------------
// crew script
// ---------------------------------------------------------------------------

#[test]
fn script_reset_prints_supervisor_steps() {
    let dir = TempDir::new().unwrap();
    crew(&dir).args(["config", "init"]).assert().success();
    crew(&dir)
        .args(["script", "reset"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("set -e"))
        .stdout(predicate::str::contains("pm2 save"));
}

#[test]
fn script_reset_reads_plan_file() {
    let dir = TempDir::new().unwrap();
    crew(&dir).args(["config", "init"]).assert().success();
    std::fs::write(
        dir.path().join("plan.json"),
        r#"{"skills": ["web-search"], "env": {"API_KEY": "abc"}}"#,
    )
    .unwrap();
    crew(&dir)
        .args(["script", "reset", "--plan", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web-search"));

    std::fs::write(dir.path().join("bad.json"), r#"{"env": {"1BAD": "x"}}"#).unwrap();
    crew(&dir)
        .args(["script", "reset", "--plan", "bad.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid env key"));
}

#[test]
fn script_install_skill_validates_name() {
    let dir = TempDir::new().unwrap();
    crew(&dir).args(["config", "init"]).assert().success();
    crew(&dir)
        .args(["script", "install-skill", "bad;name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid skill name"));
}

// ---------------------------------------------------------------------------
// crew exec
// ---------------------------------------------------------------------------

#[test]
fn exec_runs_on_local_target() {
    let dir = TempDir::new().unwrap();
    local_config(&dir);
    crew(&dir)
        .args(["exec", "local", "echo hello from crew"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from crew"));
}

#[test]
fn exec_propagates_failure() {
    let dir = TempDir::new().unwrap();
    local_config(&dir);
    crew(&dir)
        .args(["exec", "local", "echo oops >&2; exit 3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("oops"))
        .stderr(predicate::str::contains("exit code 3"));
}

#[test]
fn exec_json_reports_result() {
    let dir = TempDir::new().unwrap();
    local_config(&dir);
    let out = crew(&dir)
        .args(["--json", "exec", "local", "pwd"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["status"], "Success");
    assert_eq!(value["done"], true);
    assert_eq!(value["exit_code"], 0);
    assert!(!value["command_id"].as_str().unwrap().is_empty());
}

#[test]
fn exec_rejects_unknown_target_and_long_commands() {
    let dir = TempDir::new().unwrap();
    local_config(&dir);
    crew(&dir)
        .args(["exec", "ghost", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target 'ghost'"));

    let long = "x".repeat(4001);
    crew(&dir)
        .args(["exec", "local", &long])
        .assert()
        .failure()
        .stderr(predicate::str::contains("4000 character limit"));
}
