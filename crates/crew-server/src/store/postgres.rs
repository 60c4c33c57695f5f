use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crew_core::config::DatabaseConfig;
use crew_core::instance::{InstanceRecord, Metrics};
use crew_core::reconcile::Correction;
use crew_core::types::InstanceStatus;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::InstanceStore;

const COLUMNS: &str = "id, owner_id, agent_id, target, address, auth_secret, status, \
     cpu_percent, memory_mb, storage_bytes, last_heartbeat, created_at, updated_at";

/// PostgreSQL-backed store. Status is kept as text and normalized on read, so
/// rows written by older code with raw power-state values still load.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("database.url is not set")?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .context("failed to connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        info!(max_connections = config.max_connections, "database ready");
        Ok(Self { pool })
    }

    fn row_to_record(row: &PgRow) -> Result<InstanceRecord> {
        let status: String = row.try_get("status")?;
        Ok(InstanceRecord {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            agent_id: row.try_get("agent_id")?,
            target: row.try_get("target")?,
            address: row.try_get("address")?,
            auth_secret: row.try_get("auth_secret")?,
            status: InstanceStatus::normalize(&status),
            metrics: Metrics {
                cpu_percent: row.try_get("cpu_percent")?,
                memory_mb: row.try_get("memory_mb")?,
                storage_bytes: row.try_get("storage_bytes")?,
            },
            last_heartbeat: row.try_get("last_heartbeat")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl InstanceStore for PgStore {
    async fn insert(&self, r: &InstanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instances (id, owner_id, agent_id, target, address, auth_secret, status,
                                   cpu_percent, memory_mb, storage_bytes, last_heartbeat,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(r.id)
        .bind(&r.owner_id)
        .bind(&r.agent_id)
        .bind(&r.target)
        .bind(&r.address)
        .bind(&r.auth_secret)
        .bind(r.status.as_str())
        .bind(r.metrics.cpu_percent)
        .bind(r.metrics.memory_mb)
        .bind(r.metrics.storage_bytes)
        .bind(r.last_heartbeat)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<InstanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM instances WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn get(&self, owner: &str, id: Uuid) -> Result<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM instances WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn update_status(&self, owner: &str, id: Uuid, status: InstanceStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE instances SET status = $2, updated_at = now() \
             WHERE id = $1 AND owner_id = $3 AND status <> 'terminated' AND status <> $2",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_correction(&self, owner: &str, id: Uuid, c: &Correction) -> Result<()> {
        if c.is_empty() {
            return Ok(());
        }
        let metrics = c.metrics.as_ref();
        sqlx::query(
            r#"
            UPDATE instances SET
                status = CASE WHEN status = 'terminated' OR $2::text IS NULL THEN status ELSE $2 END,
                address = COALESCE($3, address),
                cpu_percent = CASE WHEN $4 THEN $5 ELSE cpu_percent END,
                memory_mb = CASE WHEN $4 THEN $6 ELSE memory_mb END,
                storage_bytes = CASE WHEN $4 THEN $7 ELSE storage_bytes END,
                updated_at = now()
            WHERE id = $1 AND owner_id = $8
            "#,
        )
        .bind(id)
        .bind(c.status.map(InstanceStatus::as_str))
        .bind(&c.address)
        .bind(metrics.is_some())
        .bind(metrics.and_then(|m| m.cpu_percent))
        .bind(metrics.and_then(|m| m.memory_mb))
        .bind(metrics.and_then(|m| m.storage_bytes))
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_secret(&self, secret: &str) -> Result<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM instances WHERE auth_secret = $1"
        ))
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn record_heartbeat(
        &self,
        id: Uuid,
        status: Option<InstanceStatus>,
        metrics: &Metrics,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE instances SET
                status = CASE WHEN status = 'terminated' OR $2::text IS NULL THEN status ELSE $2 END,
                cpu_percent = COALESCE($3, cpu_percent),
                memory_mb = COALESCE($4, memory_mb),
                storage_bytes = COALESCE($5, storage_bytes),
                last_heartbeat = $6,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.map(InstanceStatus::as_str))
        .bind(metrics.cpu_percent)
        .bind(metrics.memory_mb)
        .bind(metrics.storage_bytes)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
