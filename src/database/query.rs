//! BI-friendly SQL query facade over stored events and metrics.
//!
//! Grounded on `original_source/loglens/storage/query.py`: same query
//! shapes, same `DATE_TRUNC`-based time bucketing, same quirk where
//! `query_top_sources(by="error_count")` and `query_error_rate_by_source`
//! define "error" differently (single ERROR level vs. ERROR/CRITICAL/FATAL) —
//! preserved rather than harmonized, see DESIGN.md.

use crate::database::Storage;
use crate::error::{LogLensError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::types::Value as DuckValue;
use serde_json::Value;
use std::collections::HashMap;

/// Time bucket granularity for `DATE_TRUNC`-based grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeBucket {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(LogLensError::QueryError(format!(
                "unknown time bucket '{other}', expected one of: second, minute, hour, day, week, month"
            ))),
        }
    }

    fn sql_unit(self) -> &'static str {
        match self {
            Self::Second => "SECOND",
            Self::Minute => "MINUTE",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
        }
    }

    fn expr(self, column: &str) -> String {
        format!("DATE_TRUNC('{}', {})", self.sql_unit(), column)
    }
}

/// One row of a time-bucketed metric trend.
#[derive(Debug, Clone)]
pub struct MetricBucketRow {
    pub bucket_time: DateTime<Utc>,
    pub metric_value: Option<f64>,
    pub sample_count: u64,
}

/// One row of the top-sources ranking.
#[derive(Debug, Clone)]
pub struct TopSourceRow {
    pub source: String,
    pub event_count: u64,
    pub error_count: u64,
    pub warning_count: u64,
}

/// One row of the error-rate-by-source-and-bucket report.
#[derive(Debug, Clone)]
pub struct ErrorRateRow {
    pub bucket_time: DateTime<Utc>,
    pub source: String,
    pub total_events: u64,
    pub error_count: u64,
    pub error_rate: Option<f64>,
}

/// One expanded row from a grouped metric's stored JSON.
#[derive(Debug, Clone)]
pub struct GroupedMetricRow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub group_key: String,
    pub group_value: Option<f64>,
}

/// Facade over a [`Storage`] providing raw SQL passthrough and a handful of
/// canned BI-style reports.
pub struct QueryFacade<'a> {
    storage: &'a Storage,
}

impl<'a> QueryFacade<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Execute arbitrary SQL, returning one ordered map per row. `params`
    /// binds positionally against `?` placeholders in `sql`.
    pub fn execute_sql(&self, sql: &str, params: Option<&[Value]>) -> Result<Vec<Vec<(String, Value)>>> {
        let conn = self.storage.raw_connection()?;
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names();

        if let Some(params) = params {
            for (i, value) in params.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, json_to_duck_value(value)?)?;
            }
        }
        let mut rows = stmt.raw_query();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value: DuckValue = row.get(i)?;
                record.push((name.clone(), duck_value_to_json(value)));
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Time-bucketed aggregation of a metric's stored values.
    pub fn query_metrics_by_time_bucket(
        &self,
        metric_name: &str,
        bucket: TimeBucket,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        aggregation: &str,
    ) -> Result<Vec<MetricBucketRow>> {
        let allowed = ["AVG", "SUM", "MAX", "MIN", "COUNT"];
        if !allowed.contains(&aggregation.to_uppercase().as_str()) {
            return Err(LogLensError::QueryError(format!(
                "unsupported aggregation '{aggregation}', expected one of {allowed:?}"
            )));
        }

        let bucket_expr = bucket.expr("window_start");
        let mut sql = format!(
            "SELECT {bucket_expr} AS bucket_time, {aggregation}(value) AS metric_value, COUNT(*) AS sample_count \
             FROM metrics WHERE metric_name = '{}' AND value IS NOT NULL",
            escape(metric_name)
        );
        if let Some(s) = start {
            sql.push_str(&format!(" AND window_start >= '{}'", s.naive_utc()));
        }
        if let Some(e) = end {
            sql.push_str(&format!(" AND window_end <= '{}'", e.naive_utc()));
        }
        sql.push_str(" GROUP BY bucket_time ORDER BY bucket_time");

        let conn = self.storage.raw_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let bucket_time: NaiveDateTime = row.get(0)?;
            let sample_count: i64 = row.get(2)?;
            out.push(MetricBucketRow {
                bucket_time: DateTime::from_naive_utc_and_offset(bucket_time, Utc),
                metric_value: row.get(1)?,
                sample_count: sample_count as u64,
            });
        }
        Ok(out)
    }

    /// Metric trend — time-bucketed `AVG(value)`.
    pub fn query_metrics_trend(
        &self,
        metric_name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        bucket: TimeBucket,
    ) -> Result<Vec<MetricBucketRow>> {
        self.query_metrics_by_time_bucket(metric_name, bucket, start, end, "AVG")
    }

    /// Ranks sources by `event_count` or `error_count` (single-ERROR-level
    /// definition). Any other `by` value errors.
    pub fn query_top_sources(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: u64,
        by: &str,
    ) -> Result<Vec<TopSourceRow>> {
        if by != "event_count" && by != "error_count" {
            return Err(LogLensError::QueryError(format!("unknown 'by' parameter: {by}")));
        }

        let mut sql = "SELECT source, COUNT(*) AS event_count, \
             COUNT(CASE WHEN level = 'ERROR' THEN 1 END) AS error_count, \
             COUNT(CASE WHEN level = 'WARNING' THEN 1 END) AS warning_count \
             FROM events WHERE 1=1"
            .to_string();
        if let Some(s) = start {
            sql.push_str(&format!(" AND timestamp >= '{}'", s.naive_utc()));
        }
        if let Some(e) = end {
            sql.push_str(&format!(" AND timestamp <= '{}'", e.naive_utc()));
        }
        sql.push_str(&format!(" GROUP BY source ORDER BY {by} DESC LIMIT {limit}"));

        let conn = self.storage.raw_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let event_count: i64 = row.get(1)?;
            let error_count: i64 = row.get(2)?;
            let warning_count: i64 = row.get(3)?;
            out.push(TopSourceRow {
                source: row.get(0)?,
                event_count: event_count as u64,
                error_count: error_count as u64,
                warning_count: warning_count as u64,
            });
        }
        Ok(out)
    }

    /// Error rate per source per time bucket, using a 3-level ERROR /
    /// CRITICAL / FATAL definition of "error" (distinct from
    /// [`Self::query_top_sources`]'s single-level definition — intentional,
    /// see DESIGN.md).
    pub fn query_error_rate_by_source(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        bucket: TimeBucket,
    ) -> Result<Vec<ErrorRateRow>> {
        let bucket_expr = bucket.expr("timestamp");
        let mut sql = format!(
            "SELECT {bucket_expr} AS bucket_time, source, COUNT(*) AS total_events, \
             COUNT(CASE WHEN level IN ('ERROR', 'CRITICAL', 'FATAL') THEN 1 END) AS error_count, \
             CAST(COUNT(CASE WHEN level IN ('ERROR', 'CRITICAL', 'FATAL') THEN 1 END) AS DOUBLE) / \
                 NULLIF(COUNT(*), 0) * 100.0 AS error_rate \
             FROM events WHERE 1=1"
        );
        if let Some(s) = start {
            sql.push_str(&format!(" AND timestamp >= '{}'", s.naive_utc()));
        }
        if let Some(e) = end {
            sql.push_str(&format!(" AND timestamp <= '{}'", e.naive_utc()));
        }
        sql.push_str(" GROUP BY bucket_time, source ORDER BY bucket_time, error_rate DESC");

        let conn = self.storage.raw_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let bucket_time: NaiveDateTime = row.get(0)?;
            let total_events: i64 = row.get(2)?;
            let error_count: i64 = row.get(3)?;
            out.push(ErrorRateRow {
                bucket_time: DateTime::from_naive_utc_and_offset(bucket_time, Utc),
                source: row.get(1)?,
                total_events: total_events as u64,
                error_count: error_count as u64,
                error_rate: row.get(4)?,
            });
        }
        Ok(out)
    }

    /// Expand a grouped metric's stored JSON into one row per group key.
    pub fn query_grouped_metrics(
        &self,
        metric_name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<GroupedMetricRow>> {
        let mut sql = format!(
            "SELECT window_start, window_end, grouped_values_json FROM metrics \
             WHERE metric_name = '{}' AND grouped_values_json IS NOT NULL",
            escape(metric_name)
        );
        if let Some(s) = start {
            sql.push_str(&format!(" AND window_start >= '{}'", s.naive_utc()));
        }
        if let Some(e) = end {
            sql.push_str(&format!(" AND window_end <= '{}'", e.naive_utc()));
        }
        sql.push_str(" ORDER BY window_start DESC");

        let conn = self.storage.raw_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let window_start: NaiveDateTime = row.get(0)?;
            let window_end: NaiveDateTime = row.get(1)?;
            let grouped_json: String = row.get(2)?;
            let grouped: HashMap<String, Option<f64>> = serde_json::from_str(&grouped_json)?;
            for (key, value) in grouped {
                out.push(GroupedMetricRow {
                    window_start: DateTime::from_naive_utc_and_offset(window_start, Utc),
                    window_end: DateTime::from_naive_utc_and_offset(window_end, Utc),
                    group_key: key,
                    group_value: value,
                });
            }
        }
        Ok(out)
    }

    /// `DESCRIBE {table}` — column name/type/null/key/default/extra.
    pub fn get_table_schema(&self, table_name: &str) -> Result<Vec<Vec<(String, Value)>>> {
        if !table_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LogLensError::QueryError(format!("invalid table name: {table_name}")));
        }
        self.execute_sql(&format!("DESCRIBE {table_name}"), None)
    }

    /// `SHOW TABLES` — names of all tables in the database.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.execute_sql("SHOW TABLES", None)?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some((_, value)) = row.first() {
                if let Value::String(s) = value {
                    names.push(s.clone());
                }
            }
        }
        Ok(names)
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

/// Convert a JSON parameter value into a DuckDB-bindable value. Arrays and
/// objects have no scalar SQL representation and are rejected.
fn json_to_duck_value(value: &Value) -> Result<DuckValue> {
    match value {
        Value::Null => Ok(DuckValue::Null),
        Value::Bool(b) => Ok(DuckValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(DuckValue::BigInt(i))
            } else if let Some(f) = n.as_f64() {
                Ok(DuckValue::Double(f))
            } else {
                Err(LogLensError::QueryError(format!("unsupported numeric parameter: {n}")))
            }
        }
        Value::String(s) => Ok(DuckValue::Text(s.clone())),
        other => Err(LogLensError::QueryError(format!(
            "unsupported SQL parameter (arrays/objects are not scalar): {other}"
        ))),
    }
}

fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => Value::from(i as i64),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => serde_json::Number::from_f64(f as f64).map(Value::Number).unwrap_or(Value::Null),
        DuckValue::Double(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Timestamp(_, ts) => Value::String(ts.to_string()),
        other => Value::String(format!("{other:?}")),
    }
}
