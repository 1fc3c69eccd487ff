/// Durable, append-only log of run transitions
///
/// `LogStore` is the persistence seam; the engine only ever appends. Ids are
/// assigned by the store and define the total order of entries.

use crate::error::LogStoreError;
use crate::flow::types::ResourceId;
use crate::logs::types::{LogEntry, LogPage, LogType, NewLogEntry, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use std::sync::Mutex;

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist an entry, assigning the next id and its timestamp
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LogStoreError>;

    /// Page through a resource's entries in ascending id order
    async fn page(&self, resource_id: ResourceId, request: PageRequest) -> Result<LogPage, LogStoreError>;

    /// Every entry of one run in ascending id order
    async fn run_entries(&self, flow_run_id: &str) -> Result<Vec<LogEntry>, LogStoreError>;

    /// Remove entries created before `cutoff`, returning how many were removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, LogStoreError>;
}

/// Fixed-width UTC timestamps so TEXT comparison follows time order
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// sqlx-backed store on the shared flows database
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LogEntry, LogStoreError> {
        let id: i64 = row.get("id");
        let raw_type: String = row.get("type");
        let log_type = LogType::parse(&raw_type).ok_or_else(|| LogStoreError::Corrupt {
            id,
            reason: format!("unknown type '{}'", raw_type),
        })?;
        let raw_created: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&raw_created)
            .map_err(|e| LogStoreError::Corrupt {
                id,
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);
        let payload: Option<String> = row.get("payload");

        Ok(LogEntry {
            id,
            node_id: row.get("node_id"),
            flow_run_id: row.get("flow_run_id"),
            log_type,
            payload: match payload {
                Some(json) => serde_json::from_str(&json)?,
                None => serde_json::Value::Null,
            },
            created_at,
            resource_id: row.get("resource_id"),
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LogStoreError> {
        // Stored at microsecond precision; the returned entry must match a later read
        let created_at = Utc::now().trunc_subsecs(6);
        let result = sqlx::query(
            r#"
            INSERT INTO resource_flow_logs
                (resource_id, flow_run_id, node_id, type, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.resource_id)
        .bind(&entry.flow_run_id)
        .bind(&entry.node_id)
        .bind(entry.log_type.as_str())
        .bind(serde_json::to_string(&entry.payload)?)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(LogEntry {
            id: result.last_insert_rowid(),
            node_id: entry.node_id,
            flow_run_id: entry.flow_run_id,
            log_type: entry.log_type,
            payload: entry.payload,
            created_at,
            resource_id: entry.resource_id,
        })
    }

    async fn page(&self, resource_id: ResourceId, request: PageRequest) -> Result<LogPage, LogStoreError> {
        let offset = request.offset().map_err(LogStoreError::InvalidPage)?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM resource_flow_logs WHERE resource_id = ?")
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let rows = sqlx::query(
            r#"
            SELECT id, resource_id, flow_run_id, node_id, type, payload, created_at
            FROM resource_flow_logs
            WHERE resource_id = ?
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(resource_id)
        .bind(i64::from(request.limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(LogPage {
            data: rows.iter().map(Self::entry_from_row).collect::<Result<_, _>>()?,
            total: total.max(0) as u64,
            page: request.page,
            limit: request.limit,
        })
    }

    async fn run_entries(&self, flow_run_id: &str) -> Result<Vec<LogEntry>, LogStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, resource_id, flow_run_id, node_id, type, payload, created_at
            FROM resource_flow_logs
            WHERE flow_run_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(flow_run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, LogStoreError> {
        let result = sqlx::query("DELETE FROM resource_flow_logs WHERE created_at < ?")
            .bind(format_timestamp(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-process store for tests and database-less runs
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    entries: Vec<LogEntry>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock still holds consistent entries; every mutation is a single push or retain
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LogStoreError> {
        let mut state = self.lock();
        state.last_id += 1;
        let stored = LogEntry {
            id: state.last_id,
            node_id: entry.node_id,
            flow_run_id: entry.flow_run_id,
            log_type: entry.log_type,
            payload: entry.payload,
            created_at: Utc::now(),
            resource_id: entry.resource_id,
        };
        state.entries.push(stored.clone());
        Ok(stored)
    }

    async fn page(&self, resource_id: ResourceId, request: PageRequest) -> Result<LogPage, LogStoreError> {
        let offset = request.offset().map_err(LogStoreError::InvalidPage)?;
        let state = self.lock();
        let matching: Vec<&LogEntry> = state
            .entries
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .collect();

        Ok(LogPage {
            total: matching.len() as u64,
            data: matching
                .into_iter()
                .skip(offset as usize)
                .take(request.limit as usize)
                .cloned()
                .collect(),
            page: request.page,
            limit: request.limit,
        })
    }

    async fn run_entries(&self, flow_run_id: &str) -> Result<Vec<LogEntry>, LogStoreError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|e| e.flow_run_id == flow_run_id)
            .cloned()
            .collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, LogStoreError> {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.created_at >= cutoff);
        Ok((before - state.entries.len()) as u64)
    }
}
