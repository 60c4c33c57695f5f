use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use crew_core::config::{LifecycleConfig, TargetConfig};
use crew_core::shell::render_template;
use crew_core::types::{Action, PowerState};
use crew_exec::ExecError;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

/// What the lifecycle provider knows about a target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetDescription {
    pub state: PowerState,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    Start,
    Stop,
    Reboot,
    Terminate,
}

impl PowerOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerOp::Start => "start",
            PowerOp::Stop => "stop",
            PowerOp::Reboot => "reboot",
            PowerOp::Terminate => "terminate",
        }
    }

    pub fn from_action(action: Action) -> Option<PowerOp> {
        match action {
            Action::Start => Some(PowerOp::Start),
            Action::Stop => Some(PowerOp::Stop),
            Action::Reboot => Some(PowerOp::Reboot),
            Action::Terminate => Some(PowerOp::Terminate),
            Action::Reset | Action::InstallSkill | Action::Status => None,
        }
    }
}

/// Machine-level control of targets: describe power state, start, stop,
/// reboot and terminate.
#[async_trait]
pub trait LifecycleProvider: Send + Sync {
    async fn describe(&self, target: &str) -> Result<TargetDescription, ExecError>;

    async fn power(&self, target: &str, op: PowerOp) -> Result<(), ExecError>;
}

// ─── HookLifecycle ────────────────────────────────────────────────────────

/// Runs operator-supplied shell commands for each lifecycle operation.
pub struct HookLifecycle {
    hooks: LifecycleConfig,
}

impl HookLifecycle {
    pub fn new(hooks: LifecycleConfig) -> Self {
        Self { hooks }
    }

    fn template(&self, name: &str) -> Option<&str> {
        match name {
            "describe" => self.hooks.describe.as_deref(),
            "start" => self.hooks.start.as_deref(),
            "stop" => self.hooks.stop.as_deref(),
            "reboot" => self.hooks.reboot.as_deref(),
            "terminate" => self.hooks.terminate.as_deref(),
            _ => None,
        }
    }

    async fn run(&self, name: &str, target: &str) -> Result<String, ExecError> {
        let template = self
            .template(name)
            .ok_or_else(|| ExecError::Rejected(format!("no {name} hook configured")))?;
        let script = render_template(template, &[("target", target)]);
        debug!(hook = name, target_id = %target, "running lifecycle hook");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Process(format!("failed to spawn {name} hook: {e}")))?;

        let timeout = Duration::from_secs(self.hooks.timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecError::Process(format!(
                    "{name} hook timed out after {}s",
                    timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExecError::Rejected(if stderr.is_empty() {
                format!("{name} hook exited with {}", output.status)
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LifecycleProvider for HookLifecycle {
    async fn describe(&self, target: &str) -> Result<TargetDescription, ExecError> {
        let stdout = self.run("describe", target).await?;
        let line = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| ExecError::Process("describe hook printed no JSON".into()))?;
        serde_json::from_str(line)
            .map_err(|e| ExecError::Process(format!("describe hook output: {e}")))
    }

    async fn power(&self, target: &str, op: PowerOp) -> Result<(), ExecError> {
        self.run(op.as_str(), target).await?;
        info!(target_id = %target, op = op.as_str(), "lifecycle operation accepted");
        Ok(())
    }
}

// ─── StaticLifecycle ──────────────────────────────────────────────────────

/// For fixed fleets: every configured target is always running at its
/// configured address, and power operations are refused.
pub struct StaticLifecycle {
    targets: BTreeMap<String, TargetConfig>,
}

impl StaticLifecycle {
    pub fn new(targets: BTreeMap<String, TargetConfig>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl LifecycleProvider for StaticLifecycle {
    async fn describe(&self, target: &str) -> Result<TargetDescription, ExecError> {
        let config = self
            .targets
            .get(target)
            .ok_or_else(|| ExecError::InvalidTarget(target.to_string()))?;
        Ok(TargetDescription {
            state: PowerState::Running,
            address: config.address(),
        })
    }

    async fn power(&self, target: &str, op: PowerOp) -> Result<(), ExecError> {
        if !self.targets.contains_key(target) {
            return Err(ExecError::InvalidTarget(target.to_string()));
        }
        Err(ExecError::Rejected(format!(
            "{} is unavailable: no lifecycle hooks configured",
            op.as_str()
        )))
    }
}
