use crate::types::InstanceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Last known resource usage of an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bytes: Option<i64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none() && self.memory_mb.is_none() && self.storage_bytes.is_none()
    }
}

/// One provisioned agent and the target it runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub agent_id: String,
    /// Opaque target identifier understood by the execution channel.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Shared secret the instance presents on heartbeats. Never serialized.
    #[serde(default, skip_serializing)]
    pub auth_secret: Option<String>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// A freshly provisioned record, in `deploying`.
    pub fn new(owner_id: &str, agent_id: &str, target: &str, auth_secret: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            agent_id: agent_id.to_string(),
            target: target.to_string(),
            address: None,
            auth_secret,
            status: InstanceStatus::Deploying,
            metrics: Metrics::default(),
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the status unless the record is already terminated.
    /// Returns whether the status changed.
    pub fn transition(&mut self, next: InstanceStatus) -> bool {
        if self.status.is_terminated() || self.status == next {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}
