//! Shell script composition.
//!
//! Each operation that mutates or inspects a target is expressed as a
//! [`Script`]: an ordered list of shell commands submitted as one invocation.
//! File bodies travel base64-encoded and every interpolated value goes through
//! [`shell::quote`]. Operator-configured command prefixes (supervisor binary,
//! skill installer, status command) are inserted verbatim.

use crate::config::RemoteConfig;
use crate::cron::content_hash;
use crate::error::{CrewError, Result};
use crate::paths::{validate_skill_name, AgentLayout};
use crate::shell::{self, quote, quote_if_needed};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Exit code of the cron write script when the live crontab no longer matches
/// the table the edit was based on.
pub const CRON_CONFLICT_EXIT: i32 = 3;

/// Exit code of the file read script when the file does not exist.
pub const FILE_MISSING_EXIT: i32 = 44;

/// Suffix of the staging file a write decodes into before the rename.
pub const STAGING_SUFFIX: &str = ".crew-tmp";

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    commands: Vec<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<String> {
        self.commands
    }

    pub fn text(&self) -> String {
        shell::join_lines(&self.commands)
    }
}

/// `printf '%s' <b64> | base64 -d > <dest>`
fn decode_into(content: &[u8], dest: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    format!("printf '%s' {} | base64 -d > {}", quote(&encoded), dest)
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

// ---------------------------------------------------------------------------
// ResetPlan
// ---------------------------------------------------------------------------

static ENV_KEY_RE: OnceLock<Regex> = OnceLock::new();
static FILE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn env_key_re() -> &'static Regex {
    ENV_KEY_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn file_name_re() -> &'static Regex {
    FILE_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap())
}

/// Desired state of the agent after a reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetPlan {
    /// Agent config JSON. The configured default is written when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// `.env` entries. The file is left untouched when empty.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Workspace files keyed by bare file name.
    #[serde(default)]
    pub workspace_files: BTreeMap<String, String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl ResetPlan {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.env {
            if !env_key_re().is_match(key) {
                return Err(CrewError::InvalidResetPlan(format!(
                    "invalid env key '{key}'"
                )));
            }
            if value.contains('\n') || value.contains('\r') {
                return Err(CrewError::InvalidResetPlan(format!(
                    "env value for '{key}' must be a single line"
                )));
            }
        }
        for name in self.workspace_files.keys() {
            if !file_name_re().is_match(name) {
                return Err(CrewError::InvalidResetPlan(format!(
                    "invalid workspace file name '{name}'"
                )));
            }
        }
        for skill in &self.skills {
            validate_skill_name(skill)?;
        }
        Ok(())
    }

    fn env_text(&self) -> String {
        self.env
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ScriptComposer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptComposer {
    remote: RemoteConfig,
    layout: AgentLayout,
}

impl ScriptComposer {
    pub fn new(remote: RemoteConfig) -> Self {
        let layout = remote.layout();
        Self { remote, layout }
    }

    pub fn layout(&self) -> &AgentLayout {
        &self.layout
    }

    pub fn heartbeat_marker(&self) -> &str {
        &self.remote.heartbeat_marker
    }

    fn supervisor(&self) -> String {
        quote_if_needed(&self.remote.supervisor.bin)
    }

    fn crontab(&self) -> String {
        quote_if_needed(&self.remote.crontab_bin)
    }

    /// Stop the agent, rebuild its directories and files, reinstall skills and
    /// start it again under the supervisor.
    pub fn reset(&self, plan: &ResetPlan) -> Result<Script> {
        plan.validate()?;
        let sup = &self.remote.supervisor;
        let bin = self.supervisor();
        let name = quote(&sup.process_name);
        let workspace = quote(&self.layout.workspace);
        let skills = quote(&self.layout.skills);

        let mut s = Script::new();
        s.push("set -e");
        s.push(format!("{bin} stop {name} >/dev/null 2>&1 || true"));
        s.push(format!("rm -rf {workspace} {skills}"));
        s.push(format!("mkdir -p {workspace} {skills}"));

        let config = plan
            .config
            .as_ref()
            .unwrap_or(&self.remote.default_agent_config);
        let mut config_text = serde_json::to_string_pretty(config)?;
        config_text.push('\n');
        s.push(decode_into(
            config_text.as_bytes(),
            &quote(&self.layout.config_file()),
        ));

        if !plan.env.is_empty() {
            s.push(decode_into(
                plan.env_text().as_bytes(),
                &quote(&self.layout.env_file()),
            ));
        }

        for (file, content) in &plan.workspace_files {
            s.push(decode_into(
                content.as_bytes(),
                &quote(&self.layout.workspace_file(file)),
            ));
        }

        for skill in &plan.skills {
            s.push(format!(
                "(cd {workspace} && {} {}) || true",
                self.remote.skill_installer,
                quote(skill)
            ));
        }

        s.push(format!("{bin} delete {name} >/dev/null 2>&1 || true"));
        s.push(format!("cd {}", quote(&self.layout.root)));
        let mut start = format!(
            "{bin} start {} --name {name} --max-restarts {} --restart-delay {}",
            quote(&sup.start_script),
            sup.max_restarts,
            sup.restart_delay_ms
        );
        if !sup.start_args.is_empty() {
            start.push_str(" --");
            for arg in &sup.start_args {
                start.push(' ');
                start.push_str(&quote(arg));
            }
        }
        s.push(start);
        s.push(format!("{bin} save"));
        Ok(s)
    }

    pub fn install_skill(&self, skill: &str) -> Result<Script> {
        validate_skill_name(skill)?;
        let mut s = Script::new();
        s.push(format!("mkdir -p {}", quote(&self.layout.workspace)));
        s.push(format!(
            "cd {} && {} {}",
            quote(&self.layout.workspace),
            self.remote.skill_installer,
            quote(skill)
        ));
        Ok(s)
    }

    /// Print a one-line JSON self-report.
    pub fn status_report(&self) -> Script {
        let mut s = Script::new();
        if let Some(cmd) = &self.remote.status_command {
            s.push(cmd.clone());
            return s;
        }
        let bin = self.supervisor();
        let name = quote(&self.remote.supervisor.process_name);
        s.push("status=offline");
        s.push(format!("pid=$({bin} pid {name} 2>/dev/null | tail -n 1)"));
        s.push("case \"$pid\" in ''|0|*[!0-9]*) ;; *) status=online ;; esac");
        s.push(
            "cpu=$(awk '/^cpu /{u=$2+$4; t=$2+$4+$5; if (t>0) printf \"%.1f\", 100*u/t}' /proc/stat 2>/dev/null)",
        );
        s.push(
            "mem=$(awk '/^MemTotal:/{t=$2} /^MemAvailable:/{a=$2} END{if (t>0) printf \"%d\", (t-a)/1024}' /proc/meminfo 2>/dev/null)",
        );
        s.push(format!(
            "storage=$(du -sk {} 2>/dev/null | cut -f1)",
            quote(&self.layout.root)
        ));
        s.push(
            "printf '{\"status\":\"%s\",\"cpu_percent\":%s,\"memory_mb\":%s,\"storage_bytes\":%s}\\n' \"$status\" \"${cpu:-null}\" \"${mem:-null}\" \"$(( ${storage:-0} * 1024 ))\"",
        );
        s
    }

    /// Print the file at `path` (already resolved), or exit with
    /// [`FILE_MISSING_EXIT`] when it does not exist.
    pub fn read_file(&self, path: &str) -> Script {
        let p = quote(path);
        let mut s = Script::new();
        s.push(format!("if [ ! -f {p} ]; then exit {FILE_MISSING_EXIT}; fi"));
        s.push(format!("cat -- {p}"));
        s
    }

    /// Replace the file at `path` (already resolved) with `content`.
    pub fn write_file(&self, path: &str, content: &[u8]) -> Script {
        let staging = quote(&format!("{path}{STAGING_SUFFIX}"));
        let mut s = Script::new();
        s.push("set -e");
        s.push(format!("mkdir -p {}", quote(parent_dir(path))));
        s.push(decode_into(content, &staging));
        s.push(format!("mv -f {staging} {}", quote(path)));
        s
    }

    /// Print the current crontab; empty output when there is none.
    pub fn read_crontab(&self) -> Script {
        let mut s = Script::new();
        s.push(format!("{} -l 2>/dev/null || true", self.crontab()));
        s
    }

    /// Install `new_table` only if the live crontab still hashes to the hash of
    /// `based_on`; otherwise exit with [`CRON_CONFLICT_EXIT`].
    pub fn write_crontab(&self, based_on: &str, new_table: &str) -> Script {
        let crontab = self.crontab();
        let expected = quote(&content_hash(based_on));
        let mut s = Script::new();
        s.push(format!(
            "current=$({crontab} -l 2>/dev/null | sha256sum | cut -d' ' -f1)"
        ));
        s.push(format!(
            "if [ \"$current\" != {expected} ]; then echo 'crontab changed since it was read' >&2; exit {CRON_CONFLICT_EXIT}; fi"
        ));
        s.push("tmp=$(mktemp)");
        s.push(decode_into(new_table.as_bytes(), "\"$tmp\""));
        s.push(format!("{crontab} \"$tmp\""));
        s.push("rc=$?");
        s.push("rm -f \"$tmp\"");
        s.push("exit $rc");
        s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
