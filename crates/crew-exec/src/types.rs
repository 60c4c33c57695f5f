use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── InvocationStatus ─────────────────────────────────────────────────────

/// Lifecycle status of one submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Delayed,
    Cancelling,
    Success,
    Cancelled,
    TimedOut,
    Failed,
    DeliveryTimedOut,
    ExecutionTimedOut,
    Undeliverable,
    InvalidPlatform,
    Terminated,
    AccessDenied,
}

impl InvocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvocationStatus::Pending => "Pending",
            InvocationStatus::InProgress => "InProgress",
            InvocationStatus::Delayed => "Delayed",
            InvocationStatus::Cancelling => "Cancelling",
            InvocationStatus::Success => "Success",
            InvocationStatus::Cancelled => "Cancelled",
            InvocationStatus::TimedOut => "TimedOut",
            InvocationStatus::Failed => "Failed",
            InvocationStatus::DeliveryTimedOut => "DeliveryTimedOut",
            InvocationStatus::ExecutionTimedOut => "ExecutionTimedOut",
            InvocationStatus::Undeliverable => "Undeliverable",
            InvocationStatus::InvalidPlatform => "InvalidPlatform",
            InvocationStatus::Terminated => "Terminated",
            InvocationStatus::AccessDenied => "AccessDenied",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            InvocationStatus::Pending
                | InvocationStatus::InProgress
                | InvocationStatus::Delayed
                | InvocationStatus::Cancelling
        )
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Invocation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub command_id: String,
    pub target: String,
    pub command_text: String,
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
    /// Set once the invocation is terminal.
    pub exit_code: Option<i32>,
    pub requested_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Invocation {
    pub fn pending(command_id: &str, target: &str, command_text: &str) -> Self {
        Self {
            command_id: command_id.to_string(),
            target: target.to_string(),
            command_text: command_text.to_string(),
            status: InvocationStatus::Pending,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            requested_at: Utc::now(),
            finished_at: None,
        }
    }
}

// ─── SendRequest ──────────────────────────────────────────────────────────

/// One execution request: the commands run in order in a single shell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl SendRequest {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            ..Default::default()
        }
    }
}

// ─── PollResult ───────────────────────────────────────────────────────────

/// Snapshot of an invocation as seen by one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// False when the channel has not indexed the command yet; retry.
    pub found: bool,
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl PollResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            status: InvocationStatus::Pending,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }

    pub fn done(&self) -> bool {
        self.found && self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.found && self.status == InvocationStatus::Success
    }
}

impl From<Invocation> for PollResult {
    fn from(inv: Invocation) -> Self {
        Self {
            found: true,
            status: inv.status,
            stdout: inv.stdout,
            stderr: inv.stderr,
            exit_code: inv.exit_code,
        }
    }
}
