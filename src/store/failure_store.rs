use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::Mutex;

use crate::models::EventRecord;

// ============================================================================
// Failure Record Store
// ============================================================================

/// Terminal state of a failed record. RETRY rows are swept by the recovery
/// scheduler; SUCCESS and DEAD rows are retained indefinitely for audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureStatus {
    Retry,
    Success,
    Dead,
}

impl FailureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStatus::Retry => "RETRY",
            FailureStatus::Success => "SUCCESS",
            FailureStatus::Dead => "DEAD",
        }
    }
}

impl FromStr for FailureStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RETRY" => Ok(FailureStatus::Retry),
            "SUCCESS" => Ok(FailureStatus::Success),
            "DEAD" => Ok(FailureStatus::Dead),
            other => bail!("unknown failure status: {other}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FailureRecord {
    pub id: i32,
    pub topic: String,
    pub key: Option<i32>,
    pub payload: String,
    pub partition: i32,
    pub offset: i64,
    pub exception_message: String,
    pub status: FailureStatus,
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Rebuild the synthetic consumer record the scheduler feeds back into
    /// the event processor.
    pub fn to_event_record(&self) -> EventRecord {
        EventRecord {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            key: self.key,
            payload: self.payload.clone(),
        }
    }
}

/// Insert-side view of a failure record; the store assigns `id` and
/// `created_at`.
#[derive(Clone, Debug)]
pub struct NewFailureRecord {
    pub topic: String,
    pub key: Option<i32>,
    pub payload: String,
    pub partition: i32,
    pub offset: i64,
    pub exception_message: String,
    pub status: FailureStatus,
}

#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn save(&self, record: NewFailureRecord) -> Result<FailureRecord>;

    async fn find_by_status(&self, status: FailureStatus) -> Result<Vec<FailureRecord>>;

    async fn update_status(&self, id: i32, status: FailureStatus) -> Result<()>;
}

// ============================================================================
// PostgreSQL Backend
// ============================================================================

pub struct PostgresFailureStore {
    pool: PgPool,
}

impl PostgresFailureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the failure table if it does not exist yet. Topic provisioning
    /// is external, the failure table is ours.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS failure_records (
                id SERIAL PRIMARY KEY,
                topic TEXT NOT NULL,
                record_key INTEGER,
                payload TEXT NOT NULL,
                partition_id INTEGER NOT NULL,
                offset_value BIGINT NOT NULL,
                exception_message TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<FailureRecord> {
        let status: String = row.try_get("status")?;
        Ok(FailureRecord {
            id: row.try_get("id")?,
            topic: row.try_get("topic")?,
            key: row.try_get("record_key")?,
            payload: row.try_get("payload")?,
            partition: row.try_get("partition_id")?,
            offset: row.try_get("offset_value")?,
            exception_message: row.try_get("exception_message")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl FailureStore for PostgresFailureStore {
    async fn save(&self, record: NewFailureRecord) -> Result<FailureRecord> {
        let created_at = Utc::now();
        let row = sqlx::query(
            "INSERT INTO failure_records
                (topic, record_key, payload, partition_id, offset_value,
                 exception_message, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(&record.topic)
        .bind(record.key)
        .bind(&record.payload)
        .bind(record.partition)
        .bind(record.offset)
        .bind(&record.exception_message)
        .bind(record.status.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(FailureRecord {
            id: row.try_get("id")?,
            topic: record.topic,
            key: record.key,
            payload: record.payload,
            partition: record.partition,
            offset: record.offset,
            exception_message: record.exception_message,
            status: record.status,
            created_at,
        })
    }

    async fn find_by_status(&self, status: FailureStatus) -> Result<Vec<FailureRecord>> {
        let rows = sqlx::query(
            "SELECT id, topic, record_key, payload, partition_id, offset_value,
                    exception_message, status, created_at
             FROM failure_records
             WHERE status = $1
             ORDER BY id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn update_status(&self, id: i32, status: FailureStatus) -> Result<()> {
        sqlx::query("UPDATE failure_records SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// Backing store for tests and brokerless local runs.
#[derive(Default)]
pub struct InMemoryFailureStore {
    records: Mutex<Vec<FailureRecord>>,
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<FailureRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    async fn save(&self, record: NewFailureRecord) -> Result<FailureRecord> {
        let mut records = self.records.lock().unwrap();
        let record = FailureRecord {
            id: records.len() as i32 + 1,
            topic: record.topic,
            key: record.key,
            payload: record.payload,
            partition: record.partition,
            offset: record.offset,
            exception_message: record.exception_message,
            status: record.status,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_status(&self, status: FailureStatus) -> Result<Vec<FailureRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| r.status == status).cloned().collect())
    }

    async fn update_status(&self, id: i32, status: FailureStatus) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => bail!("no failure record with id {id}"),
        }
    }
}
