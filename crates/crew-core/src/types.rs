use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

/// Declared status of an instance record.
///
/// `Running`, `Stopped` and `Pending` are raw power-state values that older
/// writers stored verbatim; they are kept so such rows read back unchanged.
/// Every string that enters the system goes through [`InstanceStatus::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum InstanceStatus {
    Deploying,
    Starting,
    Online,
    Offline,
    Stopping,
    Error,
    Terminated,
    Running,
    Stopped,
    Pending,
}

impl InstanceStatus {
    pub fn all() -> &'static [InstanceStatus] {
        &[
            InstanceStatus::Deploying,
            InstanceStatus::Starting,
            InstanceStatus::Online,
            InstanceStatus::Offline,
            InstanceStatus::Stopping,
            InstanceStatus::Error,
            InstanceStatus::Terminated,
            InstanceStatus::Running,
            InstanceStatus::Stopped,
            InstanceStatus::Pending,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Online => "online",
            InstanceStatus::Offline => "offline",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Error => "error",
            InstanceStatus::Terminated => "terminated",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Pending => "pending",
        }
    }

    /// Map any incoming status string onto the enum. Matching ignores case and
    /// surrounding whitespace; anything unrecognized becomes `Online`.
    pub fn normalize(raw: &str) -> InstanceStatus {
        let lowered = raw.trim().to_ascii_lowercase();
        InstanceStatus::all()
            .iter()
            .copied()
            .find(|s| s.as_str() == lowered)
            .unwrap_or(InstanceStatus::Online)
    }

    pub fn is_terminated(self) -> bool {
        self == InstanceStatus::Terminated
    }
}

impl From<String> for InstanceStatus {
    fn from(raw: String) -> Self {
        InstanceStatus::normalize(&raw)
    }
}

impl From<&str> for InstanceStatus {
    fn from(raw: &str) -> Self {
        InstanceStatus::normalize(raw)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PowerState
// ---------------------------------------------------------------------------

/// Power state of a target as reported by the lifecycle provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum PowerState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Pending => "pending",
            PowerState::Running => "running",
            PowerState::Stopping => "stopping",
            PowerState::Stopped => "stopped",
            PowerState::ShuttingDown => "shutting-down",
            PowerState::Terminated => "terminated",
            PowerState::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> PowerState {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => PowerState::Pending,
            "running" => PowerState::Running,
            "stopping" => PowerState::Stopping,
            "stopped" => PowerState::Stopped,
            "shutting-down" | "shutting_down" => PowerState::ShuttingDown,
            "terminated" => PowerState::Terminated,
            _ => PowerState::Unknown,
        }
    }

    pub fn is_powered_on(self) -> bool {
        self == PowerState::Running
    }

    pub fn is_powered_off(self) -> bool {
        self == PowerState::Stopped
    }
}

impl From<String> for PowerState {
    fn from(raw: String) -> Self {
        PowerState::parse(&raw)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Reboot,
    Stop,
    Start,
    Terminate,
    Reset,
    InstallSkill,
    Status,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Reboot => "reboot",
            Action::Stop => "stop",
            Action::Start => "start",
            Action::Terminate => "terminate",
            Action::Reset => "reset",
            Action::InstallSkill => "install_skill",
            Action::Status => "status",
        }
    }

    /// Status written to the record once the action has been accepted upstream.
    pub fn resulting_status(self) -> Option<InstanceStatus> {
        match self {
            Action::Reboot | Action::Start => Some(InstanceStatus::Starting),
            Action::Stop => Some(InstanceStatus::Stopping),
            Action::Terminate => Some(InstanceStatus::Terminated),
            Action::Reset | Action::InstallSkill | Action::Status => None,
        }
    }

    /// Whether the action may run against a terminated instance.
    pub fn allowed_when_terminated(self) -> bool {
        self == Action::Status
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = crate::error::CrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reboot" => Ok(Action::Reboot),
            "stop" => Ok(Action::Stop),
            "start" => Ok(Action::Start),
            "terminate" => Ok(Action::Terminate),
            "reset" => Ok(Action::Reset),
            "install_skill" | "install-skill" => Ok(Action::InstallSkill),
            "status" => Ok(Action::Status),
            _ => Err(crate::error::CrewError::InvalidAction(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
