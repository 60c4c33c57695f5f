//! Persistence for instance records.
//!
//! Every read is scoped to an owner except [`InstanceStore::find_by_secret`],
//! which is how instances authenticate their own heartbeats. No write ever
//! moves a record out of `terminated`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crew_core::instance::{InstanceRecord, Metrics};
use crew_core::reconcile::Correction;
use crew_core::types::InstanceStatus;
use uuid::Uuid;

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn insert(&self, record: &InstanceRecord) -> Result<()>;

    /// The owner's records, newest first.
    async fn list(&self, owner: &str) -> Result<Vec<InstanceRecord>>;

    /// `None` when the record does not exist or belongs to someone else.
    async fn get(&self, owner: &str, id: Uuid) -> Result<Option<InstanceRecord>>;

    /// Returns whether a row changed. Records of other owners are left alone.
    async fn update_status(&self, owner: &str, id: Uuid, status: InstanceStatus) -> Result<bool>;

    /// No-op when the record is missing or belongs to someone else.
    async fn apply_correction(&self, owner: &str, id: Uuid, correction: &Correction)
        -> Result<()>;

    async fn find_by_secret(&self, secret: &str) -> Result<Option<InstanceRecord>>;

    /// Stamp a heartbeat. Only the metrics fields present are overwritten.
    async fn record_heartbeat(
        &self,
        id: Uuid,
        status: Option<InstanceStatus>,
        metrics: &Metrics,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
