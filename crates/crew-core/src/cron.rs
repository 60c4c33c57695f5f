//! Crontab text model.
//!
//! The remote crontab is the only store for cron jobs. A job may be preceded
//! by a `# name: <name>` comment line that carries its display name. Edits are
//! made on the text locally and written back as a whole table.

use crate::error::{CrewError, Result};
use crate::paths::sanitize_cron_name;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const NAME_PREFIX: &str = "# name: ";

static FIELD_RE: OnceLock<Regex> = OnceLock::new();

fn field_re() -> &'static Regex {
    FIELD_RE.get_or_init(|| {
        Regex::new(r"^(\*|\*/[1-9][0-9]*|[0-9]+(-[0-9]+)?(,[0-9]+(-[0-9]+)?)*)$").unwrap()
    })
}

/// Accept a schedule iff it has exactly five whitespace-separated fields and
/// each is `*`, `*/N`, or a comma-separated list of integers and ranges.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 || !fields.iter().all(|f| field_re().is_match(f)) {
        return Err(CrewError::InvalidCronSchedule(schedule.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CronJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    pub schedule: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The job line exactly as it appears in the crontab.
    pub raw: String,
    pub is_system: bool,
}

/// Validated input for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCronJob {
    pub schedule: String,
    pub command: String,
    pub name: Option<String>,
}

impl NewCronJob {
    pub fn new(schedule: &str, command: &str, name: Option<&str>) -> Result<Self> {
        let schedule = schedule.split_whitespace().collect::<Vec<_>>().join(" ");
        validate_schedule(&schedule)?;
        let command = command.trim();
        if command.is_empty() {
            return Err(CrewError::InvalidCronJob("command is required".into()));
        }
        if command.contains('\n') || command.contains('\r') {
            return Err(CrewError::InvalidCronJob(
                "command must be a single line".into(),
            ));
        }
        Ok(Self {
            schedule,
            command: command.to_string(),
            name: name.and_then(sanitize_cron_name),
        })
    }

    pub fn line(&self) -> String {
        format!("{} {}", self.schedule, self.command)
    }
}

fn name_comment(name: &str) -> String {
    format!("{NAME_PREFIX}{name}")
}

// ---------------------------------------------------------------------------
// CronTable
// ---------------------------------------------------------------------------

/// Line-preserving view of a crontab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTable {
    lines: Vec<String>,
}

impl CronTable {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// List the jobs. `system_marker` flags jobs whose command mentions it.
    pub fn jobs(&self, system_marker: &str) -> Vec<CronJob> {
        let mut jobs = Vec::new();
        let mut pending_name: Option<String> = None;
        for line in &self.lines {
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix(NAME_PREFIX.trim_end()) {
                let name = name.trim();
                pending_name = (!name.is_empty()).then(|| name.to_string());
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with('#') || is_env_assignment(trimmed) {
                pending_name = None;
                continue;
            }
            if let Some((schedule, command)) = split_job_line(trimmed) {
                let is_system = !system_marker.is_empty() && command.contains(system_marker);
                jobs.push(CronJob {
                    schedule,
                    command,
                    name: pending_name.take(),
                    raw: line.clone(),
                    is_system,
                });
            } else {
                pending_name = None;
            }
        }
        jobs
    }

    /// Append the job (and its name comment).
    pub fn add(&mut self, job: &NewCronJob) {
        if let Some(name) = &job.name {
            self.lines.push(name_comment(name));
        }
        self.lines.push(job.line());
    }

    /// Remove every line equal to `raw_line`, plus the name comment directly
    /// above it when `name` matches. Returns the number of job lines removed.
    pub fn remove(&mut self, raw_line: &str, name: Option<&str>) -> usize {
        let target = raw_line.trim_end();
        let comment = name.and_then(sanitize_cron_name).map(|n| name_comment(&n));
        let mut kept: Vec<String> = Vec::with_capacity(self.lines.len());
        let mut removed = 0;
        for line in self.lines.drain(..) {
            if line.trim_end() == target {
                removed += 1;
                if let (Some(comment), Some(prev)) = (&comment, kept.last()) {
                    if prev.trim_end() == comment {
                        kept.pop();
                    }
                }
                continue;
            }
            kept.push(line);
        }
        self.lines = kept;
        removed
    }

    pub fn find(&self, raw_line: &str, system_marker: &str) -> Option<CronJob> {
        let target = raw_line.trim_end();
        self.jobs(system_marker)
            .into_iter()
            .find(|j| j.raw.trim_end() == target)
    }

    /// Render with a trailing newline; cron ignores a last line without one.
    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Hex sha256 of `text`, matching `sha256sum` output on the target.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_env_assignment(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn split_job_line(line: &str) -> Option<(String, String)> {
    if line.starts_with('@') {
        let (special, rest) = line.split_once(char::is_whitespace)?;
        let command = rest.trim();
        return (!command.is_empty()).then(|| (special.to_string(), command.to_string()));
    }
    let mut rest = line;
    let mut fields = Vec::with_capacity(5);
    for _ in 0..5 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    let command = rest.trim();
    if command.is_empty() {
        return None;
    }
    Some((fields.join(" "), command.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
