use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::Router;
use crew_core::config::{Config, TargetConfig};
use crew_core::types::PowerState;
use crew_exec::{ExecError, ProcessChannel};
use crew_server::lifecycle::{LifecycleProvider, PowerOp, TargetDescription};
use crew_server::state::AppState;
use crew_server::store::MemoryStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const OWNER: &str = "alice";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Lifecycle provider whose power state follows the operations it receives.
struct FakeLifecycle {
    state: Mutex<PowerState>,
    ops: Mutex<Vec<PowerOp>>,
}

impl FakeLifecycle {
    fn new(state: PowerState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ops: Mutex::new(Vec::new()),
        })
    }

    fn set(&self, state: PowerState) {
        *self.state.lock().unwrap() = state;
    }

    fn ops(&self) -> Vec<PowerOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl LifecycleProvider for FakeLifecycle {
    async fn describe(&self, _target: &str) -> Result<TargetDescription, ExecError> {
        Ok(TargetDescription {
            state: *self.state.lock().unwrap(),
            address: Some("10.0.0.9".to_string()),
        })
    }

    async fn power(&self, _target: &str, op: PowerOp) -> Result<(), ExecError> {
        self.ops.lock().unwrap().push(op);
        self.set(match op {
            PowerOp::Start | PowerOp::Reboot => PowerState::Running,
            PowerOp::Stop => PowerState::Stopped,
            PowerOp::Terminate => PowerState::Terminated,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    crontab: PathBuf,
    app: Router,
    lifecycle: Arc<FakeLifecycle>,
}

/// A crontab stand-in that keeps its table next to itself.
fn fake_crontab(dir: &Path) -> PathBuf {
    let table = dir.join("crontab.txt");
    let bin = dir.join("crontab");
    let body = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-l\" ]; then cat '{0}' 2>/dev/null || exit 1; else cp \"$1\" '{0}'; fi\n",
        table.display()
    );
    std::fs::write(&bin, body).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    table
}

fn local_target(dir: &Path, platform: &str) -> TargetConfig {
    TargetConfig::Local {
        workdir: Some(dir.to_path_buf()),
        platform: platform.to_string(),
    }
}

fn harness_with(edit: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("agent");
    let crontab = fake_crontab(dir.path());

    let mut config = Config::default();
    config.exec.poll_interval_ms = 50;
    config.exec.fast_poll_attempts = 60;
    config.exec.max_file_bytes = 1024;
    config.remote.root = root.to_string_lossy().into_owned();
    config.remote.supervisor.bin = "true".to_string();
    config.remote.crontab_bin = dir.path().join("crontab").to_string_lossy().into_owned();
    config.remote.status_command = Some(
        r#"printf '{"status":"online","cpu_percent":12.5,"memory_mb":256,"storage_bytes":1024}\n'"#
            .to_string(),
    );

    let mut channel_targets = BTreeMap::new();
    channel_targets.insert("local".to_string(), local_target(dir.path(), "linux"));
    channel_targets.insert("win".to_string(), local_target(dir.path(), "windows"));
    config.targets = channel_targets.clone();
    // Known to the control plane but never registered with the channel.
    config
        .targets
        .insert("ghost".to_string(), local_target(dir.path(), "linux"));
    edit(&mut config);

    let channel = Arc::new(ProcessChannel::new(channel_targets, config.exec.clone()));
    let lifecycle = FakeLifecycle::new(PowerState::Running);
    let state = AppState::new(
        config,
        Arc::new(MemoryStore::new()),
        lifecycle.clone(),
        channel,
    );

    Harness {
        _dir: dir,
        root,
        crontab,
        app: crew_server::build_router(state),
        lifecycle,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

/// Send a request via `oneshot` and return (status, parsed JSON body).
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = axum::http::Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        req = req.header("x-owner-id", owner);
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => req.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, Some(OWNER), None).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(OWNER), Some(body)).await
}

async fn put_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "PUT", uri, Some(OWNER), Some(body)).await
}

async fn delete_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "DELETE", uri, Some(OWNER), Some(body)).await
}

async fn heartbeat(app: &Router, secret: Option<&str>, body: Option<Value>) -> StatusCode {
    let mut req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/heartbeat");
    if let Some(secret) = secret {
        req = req.header("authorization", format!("Bearer {secret}"));
    }
    let body = body
        .map(|b| serde_json::to_vec(&b).unwrap())
        .unwrap_or_default();
    let req = req.body(axum::body::Body::from(body)).unwrap();
    app.clone().oneshot(req).await.unwrap().status()
}

/// Register an instance on `target`; returns (id, auth secret).
async fn create_instance(app: &Router, target: &str) -> (String, String) {
    let (status, body) = post_json(
        app,
        "/api/instances",
        json!({ "agent_id": "agent-1", "target": target }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["instance"]["id"].as_str().unwrap().to_string(),
        body["auth_secret"].as_str().unwrap().to_string(),
    )
}

async fn stored_instance(app: &Router, id: &str) -> Value {
    let (status, body) = get(app, "/api/instances").await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == id)
        .cloned()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Instances & ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_list_instances() {
    let h = harness();
    let (status, body) = get(&h.app, "/api/instances").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (id, secret) = create_instance(&h.app, "local").await;
    assert_eq!(secret.len(), 40);

    let record = stored_instance(&h.app, &id).await;
    assert_eq!(record["status"], "deploying");
    assert!(record.get("auth_secret").is_none());
}

#[tokio::test]
async fn create_rejects_unknown_target() {
    let h = harness();
    let (status, body) = post_json(
        &h.app,
        "/api/instances",
        json!({ "agent_id": "agent-1", "target": "nowhere" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn malformed_bodies_are_400_with_json_error() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;

    let cases = [
        ("POST", "/api/instances".to_string(), json!({ "target": "local" })),
        ("POST", format!("/api/instances/{id}/command"), json!({})),
        ("POST", format!("/api/instances/{id}/cron"), json!({ "schedule": "0 9 * * *" })),
        ("DELETE", format!("/api/instances/{id}/cron"), json!({})),
        ("PUT", format!("/api/instances/{id}/files"), json!({ "path": "SOUL.md" })),
        ("POST", format!("/api/instances/{id}/actions"), json!({ "action": 5 })),
    ];
    for (method, uri, body) in cases {
        let (status, reply) = match method {
            "POST" => post_json(&h.app, &uri, body).await,
            "PUT" => put_json(&h.app, &uri, body).await,
            _ => delete_json(&h.app, &uri, body).await,
        };
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}: {reply}");
        assert!(reply["error"].is_string(), "{method} {uri}: {reply}");
    }
}

#[tokio::test]
async fn other_owners_and_bad_ids_get_uniform_404() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;

    let uri = format!("/api/instances/{id}");
    let (status, _) = send(&h.app, "GET", &uri, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&h.app, "/api/instances/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &h.app,
        "POST",
        &format!("/api/instances/{id}/command"),
        Some("mallory"),
        Some(json!({ "command": "id" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&h.app, "GET", "/api/instances", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_token_guards_everything_but_heartbeats() {
    let h = harness_with(|c| c.server.api_token = Some("tok".to_string()));
    let (status, _) = get(&h.app, "/api/instances").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = axum::http::Request::builder()
        .uri("/api/instances")
        .header("x-owner-id", OWNER)
        .header("authorization", "Bearer tok")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown secret: rejected by the heartbeat handler, not the token layer.
    assert_eq!(
        heartbeat(&h.app, Some("nope"), None).await,
        StatusCode::UNAUTHORIZED
    );
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detail_view_reconciles_running_target() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;

    let (status, body) = get(&h.app, &format!("/api/instances/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(body["address"], "10.0.0.9");
    assert_eq!(body["metrics"]["cpu_percent"], 12.5);
    assert_eq!(body["metrics"]["storage_bytes"], 1024);

    // The correction was persisted, not just rendered.
    assert_eq!(stored_instance(&h.app, &id).await["status"], "online");
}

#[tokio::test]
async fn detail_view_marks_stopped_target_offline() {
    let h = harness();
    h.lifecycle.set(PowerState::Stopped);
    let (id, _) = create_instance(&h.app, "local").await;

    let (status, body) = get(&h.app, &format!("/api/instances/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");
    assert!(body["metrics"].get("cpu_percent").is_none());
}

#[tokio::test]
async fn detail_view_survives_unreachable_target() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "ghost").await;

    // Self-report fails (target not registered), power rules still apply.
    let (status, body) = get(&h.app, &format!("/api/instances/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert!(body["metrics"].get("cpu_percent").is_none());
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_runs_and_returns_inline() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/command");

    let (status, body) = post_json(&h.app, &uri, json!({ "command": "echo hello" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["done"], true);
    assert_eq!(body["status"], "Success");
    assert_eq!(body["stdout"], "hello\n");
    assert_eq!(body["exit_code"], 0);
    assert!(body.get("message").is_none());

    let command_id = body["command_id"].as_str().unwrap();
    let (status, polled) = get(&h.app, &format!("{uri}?command_id={command_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["found"], true);
    assert_eq!(polled["stdout"], "hello\n");

    let (status, polled) = get(&h.app, &format!("{uri}?commandId={command_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["done"], true);
}

#[tokio::test]
async fn command_length_limit() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/command");

    let (status, body) = post_json(&h.app, &uri, json!({ "command": "x".repeat(4001) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("4000"));

    let exact = format!("true {}", "x".repeat(3995));
    let (status, _) = post_json(&h.app, &uri, json!({ "command": exact })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn command_poll_requires_id_and_handles_unknown() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/command");

    let (status, _) = get(&h.app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&h.app, &format!("{uri}?command_id=unknown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], false);
    assert_eq!(body["done"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn slow_command_falls_back_to_polling() {
    let h = harness_with(|c| c.exec.fast_poll_attempts = 4);
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/command");

    let (status, body) = post_json(&h.app, &uri, json!({ "command": "sleep 1; echo late" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["done"], false);
    assert!(body["message"].is_string());

    let command_id = body["command_id"].as_str().unwrap().to_string();
    let mut last = Value::Null;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_, polled) = get(&h.app, &format!("{uri}?command_id={command_id}")).await;
        last = polled;
        if last["done"] == true {
            break;
        }
    }
    assert_eq!(last["done"], true);
    assert_eq!(last["stdout"], "late\n");
}

#[tokio::test]
async fn unregistered_target_is_not_ready() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "ghost").await;
    let (status, body) = post_json(
        &h.app,
        &format!("/api/instances/{id}/command"),
        json!({ "command": "uptime" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("not ready"));
}

#[tokio::test]
async fn unsupported_platform_is_bad_gateway() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "win").await;
    let (status, _) = post_json(
        &h.app,
        &format!("/api/instances/{id}/command"),
        json!({ "command": "dir" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cron_add_list_remove() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/cron");

    let (status, body) = get(&h.app, &uri).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["jobs"], json!([]));

    let (status, body) = post_json(
        &h.app,
        &uri,
        json!({ "schedule": "0 9 * * *", "command": "/usr/bin/report.sh", "name": "Daily Report" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["job"]["name"], "Daily Report");
    assert_eq!(body["job"]["is_system"], false);

    let (status, _) = post_json(
        &h.app,
        &uri,
        json!({ "schedule": "0 9 * *", "command": "/usr/bin/report.sh" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&h.app, &uri).await;
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["raw"], "0 9 * * * /usr/bin/report.sh");

    let (status, body) = delete_json(
        &h.app,
        &uri,
        json!({ "raw": "0 9 * * * /usr/bin/report.sh", "name": "Daily Report" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["removed"], 1);

    let table = std::fs::read_to_string(&h.crontab).unwrap();
    assert!(!table.contains("Daily Report"));
    assert!(!table.contains("report.sh"));

    let (status, _) = delete_json(&h.app, &uri, json!({ "raw": "0 9 * * * /usr/bin/report.sh" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn system_cron_job_needs_force() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/cron");
    let line = "*/5 * * * * curl -fsS http://localhost:3200/api/heartbeat";

    let (status, body) = post_json(
        &h.app,
        &uri,
        json!({ "schedule": "*/5 * * * *", "command": "curl -fsS http://localhost:3200/api/heartbeat" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["job"]["is_system"], true);

    let (status, _) = delete_json(&h.app, &uri, json!({ "raw": line })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = delete_json(&h.app, &uri, json!({ "raw": line, "force": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
}

#[tokio::test]
async fn concurrent_cron_adds_are_both_kept() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/cron");

    let a = post_json(&h.app, &uri, json!({ "schedule": "0 1 * * *", "command": "a.sh" }));
    let b = post_json(&h.app, &uri, json!({ "schedule": "0 2 * * *", "command": "b.sh" }));
    let ((sa, _), (sb, _)) = tokio::join!(a, b);
    assert_eq!(sa, StatusCode::CREATED);
    assert_eq!(sb, StatusCode::CREATED);

    let (_, body) = get(&h.app, &uri).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_write_then_read() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/files");
    let content = "# Soul\nIt's $HOME `here`.\n";

    let (status, body) = put_json(&h.app, &uri, json!({ "path": "SOUL.md", "content": content })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let on_disk = h.root.join("workspace").join("SOUL.md");
    assert_eq!(body["path"], on_disk.to_str().unwrap());
    assert_eq!(std::fs::read_to_string(&on_disk).unwrap(), content);

    let (status, body) = get(&h.app, &format!("{uri}?path=SOUL.md")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], content);
}

#[tokio::test]
async fn file_access_is_contained() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/files");

    let (status, _) = get(&h.app, &format!("{uri}?path=../../etc/passwd")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = put_json(&h.app, &uri, json!({ "path": "/etc/passwd", "content": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&h.app, &format!("{uri}?path=notes/missing.md")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = put_json(
        &h.app,
        &uri,
        json!({ "path": "big.md", "content": "x".repeat(1025) }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn power_actions_update_status() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/actions");

    let (status, body) = post_json(&h.app, &uri, json!({ "action": "stop" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["instance"]["status"], "stopping");

    // Powered off now, so reboot becomes start.
    let (status, body) = post_json(&h.app, &uri, json!({ "action": "reboot" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["performed"], "start");
    assert_eq!(body["instance"]["status"], "starting");
    assert_eq!(h.lifecycle.ops(), vec![PowerOp::Stop, PowerOp::Start]);

    let (status, body) = post_json(&h.app, &uri, json!({ "action": "reboot" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["performed"], "reboot");

    let (status, _) = post_json(&h.app, &uri, json!({ "action": "explode" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_action_reports_ground_truth() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let (status, body) = post_json(
        &h.app,
        &format!("/api/instances/{id}/actions"),
        json!({ "action": "status" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["power_state"], "running");
    assert_eq!(body["self_report"]["status"], "online");
    assert_eq!(body["instance"]["status"], "online");
}

#[tokio::test]
async fn terminated_instance_accepts_only_status() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let actions = format!("/api/instances/{id}/actions");

    let (status, body) = post_json(&h.app, &actions, json!({ "action": "terminate" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance"]["status"], "terminated");

    let (status, _) = post_json(&h.app, &actions, json!({ "action": "start" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &h.app,
        &format!("/api/instances/{id}/command"),
        json!({ "command": "uptime" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(&h.app, &actions, json!({ "action": "status" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance"]["status"], "terminated");
}

#[tokio::test]
async fn install_skill_validates_name() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;
    let uri = format!("/api/instances/{id}/actions");

    let (status, _) = post_json(&h.app, &uri, json!({ "action": "install_skill" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &h.app,
        &uri,
        json!({ "action": "install_skill", "skill": "weather; rm -rf ~" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_rebuilds_agent_in_background() {
    let h = harness();
    let (id, _) = create_instance(&h.app, "local").await;

    let (status, body) = post_json(
        &h.app,
        &format!("/api/instances/{id}/actions"),
        json!({
            "action": "reset",
            "plan": { "workspace_files": { "SOUL.md": "# Fresh\n" } }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let uri = format!("/api/instances/{id}/command?command_id={command_id}");
    let mut last = Value::Null;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        last = get(&h.app, &uri).await.1;
        if last["done"] == true {
            break;
        }
    }
    assert_eq!(last["status"], "Success", "{last}");
    assert_eq!(
        std::fs::read_to_string(h.root.join("workspace/SOUL.md")).unwrap(),
        "# Fresh\n"
    );
    assert!(h.root.join("openclaw.json").is_file());
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_updates_metrics_and_status() {
    let h = harness();
    let (id, secret) = create_instance(&h.app, "local").await;

    assert_eq!(heartbeat(&h.app, None, None).await, StatusCode::UNAUTHORIZED);
    assert_eq!(
        heartbeat(&h.app, Some("wrong"), None).await,
        StatusCode::UNAUTHORIZED
    );

    let status = heartbeat(
        &h.app,
        Some(&secret),
        Some(json!({ "status": "ONLINE", "cpu_percent": 3.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = stored_instance(&h.app, &id).await;
    assert_eq!(record["status"], "online");
    assert_eq!(record["metrics"]["cpu_percent"], 3.5);
    assert!(record["last_heartbeat"].is_string());

    assert_eq!(heartbeat(&h.app, Some(&secret), None).await, StatusCode::OK);
}

#[tokio::test]
async fn heartbeat_never_resurrects_terminated() {
    let h = harness();
    let (id, secret) = create_instance(&h.app, "local").await;
    post_json(
        &h.app,
        &format!("/api/instances/{id}/actions"),
        json!({ "action": "terminate" }),
    )
    .await;

    let status = heartbeat(&h.app, Some(&secret), Some(json!({ "status": "online" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored_instance(&h.app, &id).await["status"], "terminated");
}
