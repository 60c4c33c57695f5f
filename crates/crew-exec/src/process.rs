use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use crew_core::config::{ExecConfig, TargetConfig};
use crew_core::shell::quote;
use crew_core::CrewError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::ExecChannel;
use crate::registry::InvocationRegistry;
use crate::types::{Invocation, InvocationStatus, SendRequest};
use crate::{ExecError, Result};

/// How long output readers may keep running after the shell exits.
/// Background children that inherited the pipes can hold them open.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Exit status ssh uses for its own connection errors.
const SSH_CONNECT_FAILURE: i32 = 255;

// ─── Launcher ─────────────────────────────────────────────────────────────

/// How the shell that runs a script is started.
#[derive(Debug, Clone, PartialEq)]
pub enum Launcher {
    /// `sh -s` on this host.
    Local { workdir: Option<PathBuf> },
    /// `ssh … user@host sh -s`.
    Ssh {
        program: PathBuf,
        destination: String,
        port: Option<u16>,
        identity: Option<PathBuf>,
        connect_timeout_secs: u64,
    },
}

impl Launcher {
    pub fn for_target(id: &str, target: &TargetConfig, exec: &ExecConfig) -> Result<Self> {
        if target.platform() != "linux" {
            return Err(ExecError::UnsupportedPlatform {
                target: id.to_string(),
                platform: target.platform().to_string(),
            });
        }
        match target {
            TargetConfig::Local { workdir, .. } => Ok(Launcher::Local {
                workdir: workdir.clone(),
            }),
            TargetConfig::Ssh {
                host, user, port, ..
            } => {
                if host.trim().is_empty() {
                    return Err(ExecError::InvalidTarget(id.to_string()));
                }
                let program = which::which("ssh")
                    .map_err(|_| ExecError::Process("ssh binary not found on PATH".into()))?;
                Ok(Launcher::Ssh {
                    program,
                    destination: format!("{user}@{host}"),
                    port: *port,
                    identity: target.identity_path(),
                    connect_timeout_secs: exec.ssh_connect_timeout_secs,
                })
            }
        }
    }

    fn is_ssh(&self) -> bool {
        matches!(self, Launcher::Ssh { .. })
    }

    fn command(&self) -> Command {
        match self {
            Launcher::Local { workdir } => {
                let mut cmd = Command::new("sh");
                cmd.arg("-s");
                if let Some(dir) = workdir {
                    cmd.current_dir(dir);
                }
                cmd
            }
            Launcher::Ssh {
                program,
                destination,
                port,
                identity,
                connect_timeout_secs,
            } => {
                let mut cmd = Command::new(program);
                cmd.arg("-o")
                    .arg("BatchMode=yes")
                    .arg("-o")
                    .arg(format!("ConnectTimeout={connect_timeout_secs}"))
                    .arg("-T");
                if let Some(port) = port {
                    cmd.arg("-p").arg(port.to_string());
                }
                if let Some(identity) = identity {
                    cmd.arg("-i").arg(identity);
                }
                cmd.arg(destination).arg("sh -s");
                cmd
            }
        }
    }
}

/// Build the text fed to the shell's stdin.
///
/// The commands travel base64-encoded and run through `eval` inside one brace
/// group, so nothing in the command text (a trailing `\`, a bare `}`) can
/// change how the wrapper itself parses. Commands that read stdin see
/// /dev/null instead of the rest of the script.
pub fn wrap_script(req: &SendRequest) -> String {
    let mut body = req.commands.join("\n");
    body.push('\n');
    let encoded = base64::engine::general_purpose::STANDARD.encode(body);

    let mut out = String::from("{\n");
    if let Some(dir) = &req.working_directory {
        out.push_str(&format!("cd {} || exit 1\n", quote(dir)));
    }
    // The trailing `.` keeps command substitution from eating final newlines.
    out.push_str(&format!(
        "crew_script=$(printf '%s' {} | base64 -d; echo .)\n",
        quote(&encoded)
    ));
    out.push_str("eval \"${crew_script%.}\"\n");
    out.push_str("} </dev/null\n");
    out
}

// ─── ProcessChannel ───────────────────────────────────────────────────────

/// Execution channel that runs each script in a child shell, locally or over
/// ssh, and tracks it in an [`InvocationRegistry`].
pub struct ProcessChannel {
    targets: BTreeMap<String, TargetConfig>,
    exec: ExecConfig,
    registry: Arc<InvocationRegistry>,
}

impl ProcessChannel {
    pub fn new(targets: BTreeMap<String, TargetConfig>, exec: ExecConfig) -> Self {
        let registry = Arc::new(InvocationRegistry::new(Duration::from_secs(
            exec.retention_secs,
        )));
        Self {
            targets,
            exec,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<InvocationRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ExecChannel for ProcessChannel {
    async fn send(&self, target: &str, req: SendRequest) -> Result<String> {
        let config = self
            .targets
            .get(target)
            .ok_or_else(|| ExecError::TargetNotRegistered(target.to_string()))?;
        let launcher = Launcher::for_target(target, config, &self.exec)?;
        if req.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(CrewError::InvalidCommand("no commands to run".into()).into());
        }

        let command_id = uuid::Uuid::new_v4().to_string();
        let timeout = Duration::from_secs(
            req.timeout_secs
                .unwrap_or(self.exec.command_timeout_secs)
                .max(1),
        );
        let script = wrap_script(&req);
        self.registry.insert(Invocation::pending(
            &command_id,
            target,
            &req.commands.join("\n"),
        ));

        info!(
            target_id = %target,
            command_id = %command_id,
            ssh = launcher.is_ssh(),
            "dispatched command"
        );

        tokio::spawn(execute(
            Arc::clone(&self.registry),
            command_id.clone(),
            launcher,
            script,
            timeout,
            self.exec.max_output_bytes,
        ));

        Ok(command_id)
    }

    async fn get_invocation(&self, command_id: &str, target: &str) -> Result<Option<Invocation>> {
        Ok(self.registry.get(command_id, target))
    }
}

// ─── Execution ────────────────────────────────────────────────────────────

async fn execute(
    registry: Arc<InvocationRegistry>,
    command_id: String,
    launcher: Launcher,
    script: String,
    timeout: Duration,
    max_output: usize,
) {
    let mut cmd = launcher.command();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command_id = %command_id, error = %e, "failed to start shell");
            registry.finish(
                &command_id,
                InvocationStatus::Undeliverable,
                String::new(),
                e.to_string(),
                None,
            );
            return;
        }
    };
    registry.set_status(&command_id, InvocationStatus::InProgress);

    let stdout = child.stdout.take().map(|r| drain(r, max_output));
    let stderr = child.stderr.take().map(|r| drain(r, max_output));

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(script.as_bytes()).await {
            debug!(command_id = %command_id, error = %e, "stdin closed early");
        }
        drop(stdin);
    }

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let (status, exit_code) = match waited {
        Ok(Ok(exit)) => {
            let code = exit.code().unwrap_or(-1);
            let status = if exit.success() {
                InvocationStatus::Success
            } else if launcher.is_ssh() && code == SSH_CONNECT_FAILURE {
                InvocationStatus::Undeliverable
            } else {
                InvocationStatus::Failed
            };
            (status, Some(code))
        }
        Ok(Err(e)) => {
            warn!(command_id = %command_id, error = %e, "failed to wait for shell");
            (InvocationStatus::Failed, Some(-1))
        }
        Err(_) => {
            warn!(command_id = %command_id, timeout_secs = timeout.as_secs(), "command timed out");
            let _ = child.kill().await;
            (InvocationStatus::ExecutionTimedOut, Some(-1))
        }
    };

    let (stdout, stderr) = tokio::join!(collect(stdout), collect(stderr));
    registry.finish(&command_id, status, stdout, stderr, exit_code);
    debug!(command_id = %command_id, status = %status, "command finished");
}

type Capture = (Arc<Mutex<Vec<u8>>>, JoinHandle<()>);

/// Read `reader` to EOF in the background, keeping at most `cap` bytes.
fn drain<R>(mut reader: R, cap: usize) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut b) = sink.lock() {
                        let room = cap.saturating_sub(b.len());
                        b.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        }
    });
    (buf, handle)
}

async fn collect(capture: Option<Capture>) -> String {
    let Some((buf, mut handle)) = capture else {
        return String::new();
    };
    if tokio::time::timeout(DRAIN_GRACE, &mut handle).await.is_err() {
        handle.abort();
    }
    buf.lock()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

// ─── Tests ────────────────────────────────────────────────────────────────
