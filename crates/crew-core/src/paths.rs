use crate::error::{CrewError, Result};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Remote layout constants
// ---------------------------------------------------------------------------

pub const DEFAULT_AGENT_ROOT: &str = "/home/ubuntu/.openclaw";
pub const WORKSPACE_DIR: &str = "workspace";
pub const SKILLS_DIR: &str = "skills";

pub const CONFIG_FILE: &str = "openclaw.json";
pub const ENV_FILE: &str = ".env";

/// Markdown files that live in the agent workspace and can be addressed by name.
pub const WORKSPACE_FILES: &[&str] = &[
    "SOUL.md",
    "AGENTS.md",
    "USER.md",
    "TOOLS.md",
    "IDENTITY.md",
    "HEARTBEAT.md",
    "MEMORY.md",
];

// ---------------------------------------------------------------------------
// AgentLayout
// ---------------------------------------------------------------------------

/// Absolute locations of the agent's files on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLayout {
    pub root: String,
    pub workspace: String,
    pub skills: String,
}

impl AgentLayout {
    pub fn new(root: &str) -> Self {
        let root = normalize(root);
        Self {
            workspace: format!("{root}/{WORKSPACE_DIR}"),
            skills: format!("{root}/{SKILLS_DIR}"),
            root,
        }
    }

    pub fn config_file(&self) -> String {
        format!("{}/{CONFIG_FILE}", self.root)
    }

    pub fn env_file(&self) -> String {
        format!("{}/{ENV_FILE}", self.root)
    }

    pub fn workspace_file(&self, name: &str) -> String {
        format!("{}/{name}", self.workspace)
    }

    /// Static lookup for short logical names.
    pub fn logical_path(&self, name: &str) -> Option<String> {
        match name {
            CONFIG_FILE => Some(self.config_file()),
            ENV_FILE => Some(self.env_file()),
            n if WORKSPACE_FILES.contains(&n) => Some(self.workspace_file(n)),
            _ => None,
        }
    }

    /// Resolve a caller-supplied path to an absolute path inside `root`.
    ///
    /// Logical names go through the lookup table. Anything else is joined to
    /// the root when relative, normalized, and must equal the root or start
    /// with `root + "/"`.
    pub fn resolve_file_path(&self, input: &str) -> Result<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.contains('\0') {
            return Err(CrewError::InvalidPath(input.to_string()));
        }
        if let Some(mapped) = self.logical_path(trimmed) {
            return Ok(mapped);
        }
        let joined = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("{}/{trimmed}", self.root)
        };
        let normalized = normalize(&joined);
        if normalized == self.root || normalized.starts_with(&format!("{}/", self.root)) {
            Ok(normalized)
        } else {
            Err(CrewError::InvalidPath(input.to_string()))
        }
    }
}

impl Default for AgentLayout {
    fn default() -> Self {
        AgentLayout::new(DEFAULT_AGENT_ROOT)
    }
}

/// Lexically normalize a POSIX path: collapse `//`, drop `.`, resolve `..`.
///
/// Never touches a filesystem. `..` above the root of an absolute path stays
/// at `/`; for relative paths leading `..` segments are kept.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    if absolute {
        format!("/{body}")
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static SKILL_RE: OnceLock<Regex> = OnceLock::new();

fn skill_re() -> &'static Regex {
    SKILL_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\-/]+$").unwrap())
}

/// Skill references are passed to the installer as a single argument.
pub fn validate_skill_name(name: &str) -> Result<()> {
    if name.len() > 128 || !skill_re().is_match(name) {
        return Err(CrewError::InvalidSkillName(name.to_string()));
    }
    Ok(())
}

/// Strip single quotes and control characters from a cron job name.
/// Returns `None` when nothing printable is left.
pub fn sanitize_cron_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '\'' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
