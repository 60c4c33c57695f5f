use crate::error::{CrewError, Result};
use crate::paths::{self, AgentLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "crew.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared bearer token required on `/api/*` (except heartbeats) when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:3200".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. Records are kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fast_poll_attempts")]
    pub fast_poll_attempts: u32,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_command_chars")]
    pub max_command_chars: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_fast_poll_attempts() -> u32 {
    10
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_max_command_chars() -> usize {
    4000
}

fn default_max_output_bytes() -> usize {
    48 * 1024
}

fn default_max_file_bytes() -> usize {
    1024 * 1024
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fast_poll_attempts: default_fast_poll_attempts(),
            command_timeout_secs: default_command_timeout_secs(),
            max_command_chars: default_max_command_chars(),
            max_output_bytes: default_max_output_bytes(),
            max_file_bytes: default_max_file_bytes(),
            retention_secs: default_retention_secs(),
            ssh_connect_timeout_secs: default_ssh_connect_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_bin")]
    pub bin: String,
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default = "default_start_script")]
    pub start_script: String,
    #[serde(default = "default_start_args")]
    pub start_args: Vec<String>,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

fn default_supervisor_bin() -> String {
    "pm2".to_string()
}

fn default_process_name() -> String {
    "agent".to_string()
}

fn default_start_script() -> String {
    "openclaw".to_string()
}

fn default_start_args() -> Vec<String> {
    vec!["gateway".to_string()]
}

fn default_max_restarts() -> u32 {
    10
}

fn default_restart_delay_ms() -> u64 {
    5000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bin: default_supervisor_bin(),
            process_name: default_process_name(),
            start_script: default_start_script(),
            start_args: default_start_args(),
            max_restarts: default_max_restarts(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Agent root on the target; every file the API touches lives below it.
    #[serde(default = "default_agent_root")]
    pub root: String,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Installer invoked as `<installer> <skill>` from the workspace directory.
    #[serde(default = "default_skill_installer")]
    pub skill_installer: String,
    /// Command printing a JSON self-report. A built-in reporter is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_command: Option<String>,
    /// Cron commands containing this marker are system jobs.
    #[serde(default = "default_heartbeat_marker")]
    pub heartbeat_marker: String,
    #[serde(default = "default_crontab_bin")]
    pub crontab_bin: String,
    /// Contents written to the agent config file by a reset when the request
    /// carries none.
    #[serde(default = "default_agent_config")]
    pub default_agent_config: serde_json::Value,
}

fn default_agent_root() -> String {
    paths::DEFAULT_AGENT_ROOT.to_string()
}

fn default_skill_installer() -> String {
    "npx --yes clawhub install".to_string()
}

fn default_heartbeat_marker() -> String {
    "heartbeat".to_string()
}

fn default_crontab_bin() -> String {
    "crontab".to_string()
}

fn default_agent_config() -> serde_json::Value {
    serde_json::json!({})
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            root: default_agent_root(),
            supervisor: SupervisorConfig::default(),
            skill_installer: default_skill_installer(),
            status_command: None,
            heartbeat_marker: default_heartbeat_marker(),
            crontab_bin: default_crontab_bin(),
            default_agent_config: default_agent_config(),
        }
    }
}

impl RemoteConfig {
    pub fn layout(&self) -> AgentLayout {
        AgentLayout::new(&self.root)
    }
}

// ---------------------------------------------------------------------------
// TargetConfig
// ---------------------------------------------------------------------------

/// How commands reach a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Run on the control-plane host itself.
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
        #[serde(default = "default_platform")]
        platform: String,
    },
    Ssh {
        host: String,
        #[serde(default = "default_ssh_user")]
        user: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity_file: Option<String>,
        #[serde(default = "default_platform")]
        platform: String,
    },
}

fn default_platform() -> String {
    "linux".to_string()
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

impl TargetConfig {
    pub fn platform(&self) -> &str {
        match self {
            TargetConfig::Local { platform, .. } | TargetConfig::Ssh { platform, .. } => platform,
        }
    }

    /// Network address reported for the target when no lifecycle provider knows better.
    pub fn address(&self) -> Option<String> {
        match self {
            TargetConfig::Local { .. } => Some("127.0.0.1".to_string()),
            TargetConfig::Ssh { host, .. } => Some(host.clone()),
        }
    }

    /// Identity file with a leading `~/` expanded against the home directory.
    pub fn identity_path(&self) -> Option<PathBuf> {
        let TargetConfig::Ssh {
            identity_file: Some(file),
            ..
        } = self
        else {
            return None;
        };
        match file.strip_prefix("~/") {
            Some(rest) => home::home_dir().map(|h| h.join(rest)),
            None => Some(PathBuf::from(file)),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleConfig
// ---------------------------------------------------------------------------

/// Shell command templates driving the lifecycle provider. `{target}` is
/// replaced with the quoted target id. `describe` must print JSON
/// `{"state": "...", "address": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub describe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate: Option<String>,
    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_hook_timeout_secs() -> u64 {
    60
}

impl LifecycleConfig {
    pub fn has_hooks(&self) -> bool {
        self.describe.is_some()
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            exec: ExecConfig::default(),
            remote: RemoteConfig::default(),
            targets: BTreeMap::new(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CrewError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> {
        self.targets.get(id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.remote.root.starts_with('/') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "remote.root '{}' must be an absolute path",
                    self.remote.root
                ),
            });
        }

        if self.exec.poll_interval_ms == 0 || self.exec.fast_poll_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "exec.poll_interval_ms and exec.fast_poll_attempts must be positive"
                    .to_string(),
            });
        }

        let budget_ms = self.exec.poll_interval_ms * u64::from(self.exec.fast_poll_attempts);
        if budget_ms > 30_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "fast poll budget is {budget_ms} ms (>30s holds requests open for a long time)"
                ),
            });
        }

        if self.targets.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no targets configured; every command will be rejected".to_string(),
            });
        }

        for (id, target) in &self.targets {
            if let TargetConfig::Ssh { host, .. } = target {
                if host.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("target '{id}' has an empty ssh host"),
                    });
                }
            }
            if target.platform() != "linux" {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "target '{id}' declares platform '{}'; commands will be refused",
                        target.platform()
                    ),
                });
            }
        }

        let lc = &self.lifecycle;
        let has_power_hooks =
            lc.start.is_some() || lc.stop.is_some() || lc.reboot.is_some() || lc.terminate.is_some();
        if has_power_hooks && lc.describe.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lifecycle hooks are ignored without lifecycle.describe".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
