use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crew_core::instance::{InstanceRecord, Metrics};
use crew_core::reconcile::Correction;
use crew_core::types::InstanceStatus;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::InstanceStore;

/// In-process store, used when no database URL is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, InstanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn insert(&self, record: &InstanceRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            anyhow::bail!("instance {} already exists", record.id);
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<InstanceRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<InstanceRecord> = records
            .values()
            .filter(|r| r.owner_id == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn get(&self, owner: &str, id: Uuid) -> Result<Option<InstanceRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&id).filter(|r| r.owner_id == owner).cloned())
    }

    async fn update_status(&self, owner: &str, id: Uuid, status: InstanceStatus) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(&id)
            .filter(|r| r.owner_id == owner)
            .map(|r| r.transition(status))
            .unwrap_or(false))
    }

    async fn apply_correction(
        &self,
        owner: &str,
        id: Uuid,
        correction: &Correction,
    ) -> Result<()> {
        if correction.is_empty() {
            return Ok(());
        }
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id).filter(|r| r.owner_id == owner) {
            correction.apply(record);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_secret(&self, secret: &str) -> Result<Option<InstanceRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.auth_secret.as_deref() == Some(secret))
            .cloned())
    }

    async fn record_heartbeat(
        &self,
        id: Uuid,
        status: Option<InstanceStatus>,
        metrics: &Metrics,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(());
        };
        if let Some(status) = status {
            record.transition(status);
        }
        if let Some(v) = metrics.cpu_percent {
            record.metrics.cpu_percent = Some(v);
        }
        if let Some(v) = metrics.memory_mb {
            record.metrics.memory_mb = Some(v);
        }
        if let Some(v) = metrics.storage_bytes {
            record.metrics.storage_bytes = Some(v);
        }
        record.last_heartbeat = Some(at);
        record.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str) -> InstanceRecord {
        InstanceRecord::new(owner, "agent-1", "local", Some(format!("secret-{owner}")))
    }

    #[tokio::test]
    async fn reads_are_owner_scoped() {
        let store = MemoryStore::new();
        let mine = record("alice");
        store.insert(&mine).await.unwrap();
        store.insert(&record("bob")).await.unwrap();

        assert_eq!(store.list("alice").await.unwrap().len(), 1);
        assert!(store.get("alice", mine.id).await.unwrap().is_some());
        assert!(store.get("bob", mine.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_are_owner_scoped() {
        let store = MemoryStore::new();
        let r = record("alice");
        store.insert(&r).await.unwrap();

        assert!(!store.update_status("bob", r.id, InstanceStatus::Offline).await.unwrap());
        let correction = Correction {
            status: Some(InstanceStatus::Offline),
            address: Some("10.0.0.9".into()),
            ..Default::default()
        };
        store.apply_correction("bob", r.id, &correction).await.unwrap();

        let got = store.get("alice", r.id).await.unwrap().unwrap();
        assert_eq!(got.status, r.status);
        assert_eq!(got.address, r.address);
        assert_eq!(got.updated_at, r.updated_at);

        assert!(store.update_status("alice", r.id, InstanceStatus::Offline).await.unwrap());
    }

    #[tokio::test]
    async fn terminated_is_sticky() {
        let store = MemoryStore::new();
        let r = record("alice");
        store.insert(&r).await.unwrap();
        assert!(store.update_status("alice", r.id, InstanceStatus::Terminated).await.unwrap());
        assert!(!store.update_status("alice", r.id, InstanceStatus::Online).await.unwrap());

        let correction = Correction {
            status: Some(InstanceStatus::Online),
            ..Default::default()
        };
        store.apply_correction("alice", r.id, &correction).await.unwrap();
        store
            .record_heartbeat(r.id, Some(InstanceStatus::Online), &Metrics::default(), Utc::now())
            .await
            .unwrap();
        let got = store.get("alice", r.id).await.unwrap().unwrap();
        assert_eq!(got.status, InstanceStatus::Terminated);
        assert!(got.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn heartbeat_merges_metrics() {
        let store = MemoryStore::new();
        let r = record("alice");
        store.insert(&r).await.unwrap();
        let first = Metrics {
            cpu_percent: Some(10.0),
            memory_mb: Some(512.0),
            storage_bytes: None,
        };
        store.record_heartbeat(r.id, None, &first, Utc::now()).await.unwrap();
        let second = Metrics {
            cpu_percent: Some(20.0),
            ..Default::default()
        };
        store.record_heartbeat(r.id, None, &second, Utc::now()).await.unwrap();

        let got = store.find_by_secret("secret-alice").await.unwrap().unwrap();
        assert_eq!(got.metrics.cpu_percent, Some(20.0));
        assert_eq!(got.metrics.memory_mb, Some(512.0));
        assert_eq!(got.status, InstanceStatus::Deploying);
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let store = MemoryStore::new();
        let r = record("alice");
        store.insert(&r).await.unwrap();
        assert!(store.insert(&r).await.is_err());
    }
}
