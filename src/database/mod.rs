//! Append-only persistence for events and metric results backed by an
//! embedded column-oriented engine (DuckDB via the `duckdb` crate).
//!
//! Grounded on `original_source/loglens/storage/database.py`: same schema,
//! same `MAX(id)+1` id-assignment strategy (spec.md §9 — kept deliberately,
//! not concurrency-safe by design), same query shapes. The teacher's
//! instrumented-method / `Context`-wrapped-error idiom (`database/mod.rs`)
//! is retained; the underlying engine crate is not (see DESIGN.md).

pub mod query;
pub mod schema;

use crate::error::{LogLensError, Result};
use crate::models::metric::MetricResult;
use crate::schemas::event::{Event, Level};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// An event as it is stored on disk, with its assigned id and insertion time.
#[derive(Debug, Clone)]
pub struct PersistedEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub source: String,
    pub message: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A metric result as it is stored on disk.
#[derive(Debug, Clone)]
pub struct PersistedMetric {
    pub id: i64,
    pub metric_name: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub value: Option<f64>,
    pub grouped: Option<HashMap<String, Option<f64>>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Summary statistics for one metric over an optional time range.
#[derive(Debug, Clone, Default)]
pub struct MetricSummary {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: Option<f64>,
}

/// Aggregate event counts over an optional time range.
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub by_level: Vec<(String, u64)>,
    pub by_source: Vec<(String, u64)>,
}

fn to_naive(ts: DateTime<Utc>) -> NaiveDateTime {
    ts.naive_utc()
}

fn from_naive(ts: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(ts, Utc)
}

/// A handle to a single `.db` file. Not safe for concurrent use by multiple
/// writers (spec.md §5) — callers wanting parallelism must serialize writes
/// or shard by table.
///
/// Requires scoped acquisition with guaranteed close on all exit paths: use
/// [`Storage::close`] for an explicit, ownership-consuming shutdown, or rely
/// on `Drop` for the same guarantee on early return / panic unwind.
pub struct Storage {
    conn: Option<Connection>,
    path: PathBuf,
}

impl Storage {
    /// Open (or create) a database file, creating the schema and indexes if
    /// absent.
    #[instrument]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening storage");

        let conn = Connection::open(&path)
            .map_err(|e| LogLensError::StorageUnavailable(format!("failed to open {}: {e}", path.display())))?;

        conn.execute_batch(schema::CREATE_EVENTS_TABLE)?;
        for index in schema::CREATE_EVENTS_INDEXES {
            conn.execute_batch(index)?;
        }
        conn.execute_batch(schema::CREATE_METRICS_TABLE)?;
        for index in schema::CREATE_METRICS_INDEXES {
            conn.execute_batch(index)?;
        }

        Ok(Self { conn: Some(conn), path })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| {
            LogLensError::StorageUnavailable(format!("storage at {} is closed", self.path.display()))
        })
    }

    /// Insert one event, assigning its id as `max(id) + 1`.
    #[instrument(skip(self, event))]
    pub fn insert_event(&self, event: &Event) -> Result<i64> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM events", [], |row| row.get(0))?;
        let metadata_json = serde_json::to_string(&event.metadata.0)?;

        conn.execute(
            "INSERT INTO events (id, timestamp, level, source, message, metadata_json) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id,
                to_naive(event.timestamp),
                event.level.as_str(),
                event.source,
                event.message,
                metadata_json,
            ],
        )?;

        Ok(id)
    }

    /// Insert a batch of events, preserving input order. Returns the assigned
    /// ids in the same order.
    #[instrument(skip(self, events))]
    pub fn insert_events(&self, events: &[Event]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(self.insert_event(event)?);
        }
        Ok(ids)
    }

    /// Persist a metric result, either scalar or grouped.
    #[instrument(skip(self, result))]
    pub fn insert_metric(&self, result: &MetricResult) -> Result<i64> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM metrics", [], |row| row.get(0))?;
        let grouped_json = result
            .grouped
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata_json = serde_json::to_string(&result.metadata)?;

        conn.execute(
            "INSERT INTO metrics (id, metric_name, window_start, window_end, value, grouped_values_json, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                result.metric_name,
                to_naive(result.window_start),
                to_naive(result.window_end),
                result.value,
                grouped_json,
                metadata_json,
            ],
        )?;

        Ok(id)
    }

    /// Query events, filters combining with AND, ordered `timestamp` descending.
    #[instrument(skip(self))]
    pub fn query_events(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        level: Option<&str>,
        source: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<PersistedEvent>> {
        let mut sql = "SELECT id, timestamp, level, source, message, metadata_json, created_at FROM events WHERE 1=1".to_string();
        let mut conditions = Vec::new();
        if start.is_some() {
            conditions.push(" AND timestamp >= ?".to_string());
        }
        if end.is_some() {
            conditions.push(" AND timestamp <= ?".to_string());
        }
        if level.is_some() {
            conditions.push(" AND level = ?".to_string());
        }
        if source.is_some() {
            conditions.push(" AND source = ?".to_string());
        }
        sql.push_str(&conditions.join(""));
        sql.push_str(" ORDER BY timestamp DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut idx = 1;
        if let Some(v) = start {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
            idx += 1;
        }
        if let Some(v) = end {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
            idx += 1;
        }
        if let Some(v) = level {
            stmt.raw_bind_parameter(idx, v)?;
            idx += 1;
        }
        if let Some(v) = source {
            stmt.raw_bind_parameter(idx, v)?;
        }

        let rows = stmt.raw_query();
        map_event_rows(rows)
    }

    /// Query metric rows, filters combining with AND, ordered `window_start` descending.
    #[instrument(skip(self))]
    pub fn query_metrics(
        &self,
        name: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> Result<Vec<PersistedMetric>> {
        let mut sql = "SELECT id, metric_name, window_start, window_end, value, grouped_values_json, metadata_json, created_at \
                       FROM metrics WHERE 1=1"
            .to_string();
        let mut conditions = Vec::new();
        if name.is_some() {
            conditions.push(" AND metric_name = ?".to_string());
        }
        if start.is_some() {
            conditions.push(" AND window_start >= ?".to_string());
        }
        if end.is_some() {
            conditions.push(" AND window_end <= ?".to_string());
        }
        sql.push_str(&conditions.join(""));
        sql.push_str(" ORDER BY window_start DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut idx = 1;
        if let Some(v) = name {
            stmt.raw_bind_parameter(idx, v)?;
            idx += 1;
        }
        if let Some(v) = start {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
            idx += 1;
        }
        if let Some(v) = end {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
        }

        let rows = stmt.raw_query();
        map_metric_rows(rows)
    }

    /// `{count, avg, min, max, sum}` over a metric's stored values; all nulls
    /// when `count == 0`.
    #[instrument(skip(self))]
    pub fn get_metric_summary(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MetricSummary> {
        let mut sql = "SELECT COUNT(*), AVG(value), MIN(value), MAX(value), SUM(value) FROM metrics WHERE metric_name = ?".to_string();
        if start.is_some() {
            sql.push_str(" AND window_start >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND window_end <= ?");
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        stmt.raw_bind_parameter(1, name)?;
        let mut idx = 2;
        if let Some(v) = start {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
            idx += 1;
        }
        if let Some(v) = end {
            stmt.raw_bind_parameter(idx, to_naive(v))?;
        }

        let mut rows = stmt.raw_query();
        let row = rows.next()?.ok_or_else(|| LogLensError::QueryError("no summary row returned".to_string()))?;
        let count: i64 = row.get(0)?;
        if count == 0 {
            return Ok(MetricSummary::default());
        }

        Ok(MetricSummary {
            count: count as u64,
            avg: row.get(1)?,
            min: row.get(2)?,
            max: row.get(3)?,
            sum: row.get(4)?,
        })
    }

    /// Total event count plus counts grouped by level and by source, each
    /// ordered descending.
    #[instrument(skip(self))]
    pub fn get_event_stats(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<EventStats> {
        let conn = self.conn()?;

        let mut where_clause = String::new();
        if start.is_some() {
            where_clause.push_str(" AND timestamp >= ?");
        }
        if end.is_some() {
            where_clause.push_str(" AND timestamp <= ?");
        }

        let bind_time = |stmt: &mut duckdb::Statement, base_idx: usize| -> Result<()> {
            let mut idx = base_idx;
            if let Some(v) = start {
                stmt.raw_bind_parameter(idx, to_naive(v))?;
                idx += 1;
            }
            if let Some(v) = end {
                stmt.raw_bind_parameter(idx, to_naive(v))?;
            }
            Ok(())
        };

        let total: i64 = {
            let sql = format!("SELECT COUNT(*) FROM events WHERE 1=1{where_clause}");
            let mut stmt = conn.prepare(&sql)?;
            bind_time(&mut stmt, 1)?;
            let mut rows = stmt.raw_query();
            let row = rows.next()?.ok_or_else(|| LogLensError::QueryError("no count row".to_string()))?;
            row.get(0)?
        };

        let by_level = {
            let sql = format!(
                "SELECT level, COUNT(*) as cnt FROM events WHERE 1=1{where_clause} GROUP BY level ORDER BY cnt DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            bind_time(&mut stmt, 1)?;
            let mut rows = stmt.raw_query();
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let level: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                out.push((level, count as u64));
            }
            out
        };

        let by_source = {
            let sql = format!(
                "SELECT source, COUNT(*) as cnt FROM events WHERE 1=1{where_clause} GROUP BY source ORDER BY cnt DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            bind_time(&mut stmt, 1)?;
            let mut rows = stmt.raw_query();
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let source: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                out.push((source, count as u64));
            }
            out
        };

        Ok(EventStats {
            total_events: total as u64,
            by_level,
            by_source,
        })
    }

    /// Delete events older than `cutoff`, returning the count removed.
    #[instrument(skip(self))]
    pub fn delete_old_events(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE timestamp < ?",
            params![to_naive(cutoff)],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM events WHERE timestamp < ?", params![to_naive(cutoff)])?;
        Ok(count as u64)
    }

    /// Delete metrics whose window ended before `cutoff`, returning the count removed.
    #[instrument(skip(self))]
    pub fn delete_old_metrics(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE window_end < ?",
            params![to_naive(cutoff)],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM metrics WHERE window_end < ?", params![to_naive(cutoff)])?;
        Ok(count as u64)
    }

    /// Compact on-disk storage.
    #[instrument(skip(self))]
    pub fn vacuum(&self) -> Result<()> {
        self.conn()?.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Borrow the underlying connection for raw SQL (used by the query facade).
    pub(crate) fn raw_connection(&self) -> Result<&Connection> {
        self.conn()
    }

    /// Explicitly release the connection. Using the store afterward fails
    /// with `StorageUnavailable`.
    pub fn close(mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| LogLensError::StorageUnavailable(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            warn!(path = %self.path.display(), "storage dropped without an explicit close()");
        }
    }
}

fn map_event_rows(mut rows: duckdb::Rows<'_>) -> Result<Vec<PersistedEvent>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let metadata_json: Option<String> = row.get(5)?;
        let metadata = metadata_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or(Value::Object(Default::default()));

        out.push(PersistedEvent {
            id: row.get(0)?,
            timestamp: from_naive(row.get(1)?),
            level: Level::parse(&row.get::<_, String>(2)?)?,
            source: row.get(3)?,
            message: row.get(4)?,
            metadata,
            created_at: from_naive(row.get(6)?),
        });
    }
    Ok(out)
}

fn map_metric_rows(mut rows: duckdb::Rows<'_>) -> Result<Vec<PersistedMetric>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let grouped_json: Option<String> = row.get(5)?;
        let grouped = grouped_json.map(|s| serde_json::from_str(&s)).transpose()?;
        let metadata_json: Option<String> = row.get(6)?;
        let metadata = metadata_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or(Value::Object(Default::default()));

        out.push(PersistedMetric {
            id: row.get(0)?,
            metric_name: row.get(1)?,
            window_start: from_naive(row.get(2)?),
            window_end: from_naive(row.get(3)?),
            value: row.get(4)?,
            grouped,
            metadata,
            created_at: from_naive(row.get(7)?),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::event::Level;
    use tempfile::tempdir;

    fn open_temp() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path().join("test.db")).unwrap();
        (storage, dir)
    }

    #[test]
    fn storage_idempotence_insert_then_query_desc() {
        let (storage, _dir) = open_temp();
        let base = Utc::now();
        for i in 0..5 {
            let event = Event::new(base + chrono::Duration::seconds(i), Level::Info, "app", "hello", None).unwrap();
            storage.insert_event(&event).unwrap();
        }

        let rows = storage.query_events(None, None, None, None, None).unwrap();
        assert_eq!(rows.len(), 5);
        for pair in rows.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn closed_storage_fails_on_use() {
        let (storage, _dir) = open_temp();
        storage.close().unwrap();
    }
}
