//! Status reconciliation.
//!
//! [`reconcile`] is pure: it takes the persisted record and freshly observed
//! ground truth and returns the correction to persist. Fetching the ground
//! truth and writing the correction back live in the server.

use crate::error::{CrewError, Result};
use crate::instance::{InstanceRecord, Metrics};
use crate::types::{InstanceStatus, PowerState};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SelfReport
// ---------------------------------------------------------------------------

/// Status payload printed by the status command on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfReport {
    pub status: InstanceStatus,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<f64>,
    #[serde(default)]
    pub storage_bytes: Option<i64>,
}

impl SelfReport {
    /// Parse the last JSON object line of the status command's stdout.
    pub fn parse(stdout: &str) -> Result<SelfReport> {
        let line = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| CrewError::InvalidSelfReport("no JSON object in output".into()))?;
        serde_json::from_str(line).map_err(|e| CrewError::InvalidSelfReport(e.to_string()))
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            cpu_percent: self.cpu_percent,
            memory_mb: self.memory_mb,
            storage_bytes: self.storage_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// GroundTruth / Correction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub power: PowerState,
    pub address: Option<String>,
    /// Only fetched while the target is powered on.
    pub self_report: Option<SelfReport>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correction {
    pub status: Option<InstanceStatus>,
    pub address: Option<String>,
    pub metrics: Option<Metrics>,
}

impl Correction {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.address.is_none() && self.metrics.is_none()
    }

    pub fn apply(&self, record: &mut InstanceRecord) {
        if let Some(status) = self.status {
            record.transition(status);
        }
        if let Some(address) = &self.address {
            record.address = Some(address.clone());
        }
        if let Some(metrics) = &self.metrics {
            record.metrics = metrics.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Statuses corrected to `online` when the target is powered on.
const CORRECT_WHEN_ON: &[InstanceStatus] = &[
    InstanceStatus::Deploying,
    InstanceStatus::Starting,
    InstanceStatus::Pending,
    InstanceStatus::Stopping,
];

/// Statuses corrected to `offline` when the target is powered off.
const CORRECT_WHEN_OFF: &[InstanceStatus] = &[
    InstanceStatus::Deploying,
    InstanceStatus::Starting,
    InstanceStatus::Pending,
    InstanceStatus::Online,
    InstanceStatus::Running,
    InstanceStatus::Stopping,
];

/// Status implied by the power state alone, if any rule fires.
fn power_correction(current: InstanceStatus, power: PowerState) -> Option<InstanceStatus> {
    match power {
        PowerState::Running if CORRECT_WHEN_ON.contains(&current) => Some(InstanceStatus::Online),
        PowerState::Stopped if CORRECT_WHEN_OFF.contains(&current) => {
            Some(InstanceStatus::Offline)
        }
        PowerState::Terminated => Some(InstanceStatus::Terminated),
        _ => None,
    }
}

/// Compute the correction for `record` given fresh ground truth.
///
/// A self-report (present only while powered on) wins over the power-state
/// rules. A terminated record never changes.
pub fn reconcile(record: &InstanceRecord, truth: &GroundTruth) -> Correction {
    let current = record.status;
    if current.is_terminated() {
        return Correction::default();
    }

    let mut correction = Correction::default();

    let report = truth
        .self_report
        .as_ref()
        .filter(|_| truth.power.is_powered_on());

    let next = match report {
        // A running target cannot terminate itself through its own report.
        Some(r) if !r.status.is_terminated() => Some(r.status),
        _ => power_correction(current, truth.power),
    };
    correction.status = next.filter(|s| *s != current);

    if let Some(r) = report {
        let metrics = r.metrics();
        if !metrics.is_empty() && metrics != record.metrics {
            correction.metrics = Some(metrics);
        }
    }

    if let Some(address) = &truth.address {
        if record.address.as_deref() != Some(address.as_str()) {
            correction.address = Some(address.clone());
        }
    }

    correction
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
