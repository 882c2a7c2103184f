//! Metric definitions: declarative time-windowed aggregation specs.

use crate::error::{LogLensError, Result};
use crate::schemas::event::Event;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A predicate applied to an event: `true` if the event matches the metric.
pub type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Extracts a grouping key from an event.
pub type GroupKeyFn = Arc<dyn Fn(&Event) -> String + Send + Sync>;

/// Extracts a numeric value from an event for value-requiring aggregations.
pub type ValueExtractorFn = Arc<dyn Fn(&Event) -> f64 + Send + Sync>;

/// A caller-supplied aggregation over a buffered event slice.
pub type CustomAggregationFn = Arc<dyn Fn(&[Event]) -> Option<f64> + Send + Sync>;

/// Built-in aggregation kinds, plus an escape hatch for a caller-provided function.
#[derive(Clone)]
pub enum AggregationKind {
    Count,
    Rate,
    Average,
    Sum,
    Min,
    Max,
    Percentile(f64),
    UniqueCount,
    Custom(CustomAggregationFn),
}

impl fmt::Debug for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationKind::Count => write!(f, "Count"),
            AggregationKind::Rate => write!(f, "Rate"),
            AggregationKind::Average => write!(f, "Average"),
            AggregationKind::Sum => write!(f, "Sum"),
            AggregationKind::Min => write!(f, "Min"),
            AggregationKind::Max => write!(f, "Max"),
            AggregationKind::Percentile(p) => write!(f, "Percentile({p})"),
            AggregationKind::UniqueCount => write!(f, "UniqueCount"),
            AggregationKind::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl AggregationKind {
    /// Resolve a built-in aggregation name, case-insensitively. Percentile
    /// requires `percentile` to already have been validated by the caller.
    pub fn parse(name: &str, percentile: Option<f64>) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "count" => Ok(AggregationKind::Count),
            "rate" => Ok(AggregationKind::Rate),
            "average" => Ok(AggregationKind::Average),
            "sum" => Ok(AggregationKind::Sum),
            "min" => Ok(AggregationKind::Min),
            "max" => Ok(AggregationKind::Max),
            "percentile" => {
                let p = percentile.ok_or_else(|| {
                    LogLensError::InvalidMetric(
                        "percentile aggregation requires a 'percentile' value".to_string(),
                    )
                })?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(LogLensError::InvalidMetric(format!(
                        "percentile must be in [0, 100], got {p}"
                    )));
                }
                Ok(AggregationKind::Percentile(p))
            }
            "unique_count" => Ok(AggregationKind::UniqueCount),
            other => Err(LogLensError::InvalidMetric(format!(
                "unsupported aggregation type: {other}. expected one of: count, rate, average, \
                 sum, min, max, percentile, unique_count"
            ))),
        }
    }

    /// Whether this aggregation requires a `valueExtractor` to be supplied.
    pub fn requires_value_extractor(&self) -> bool {
        matches!(
            self,
            AggregationKind::Average
                | AggregationKind::Sum
                | AggregationKind::Min
                | AggregationKind::Max
                | AggregationKind::Percentile(_)
                | AggregationKind::UniqueCount
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregationKind::Count => "count",
            AggregationKind::Rate => "rate",
            AggregationKind::Average => "average",
            AggregationKind::Sum => "sum",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Percentile(_) => "percentile",
            AggregationKind::UniqueCount => "unique_count",
            AggregationKind::Custom(_) => "custom",
        }
    }
}

/// Parse a window string of the form `<int><s|m|h|d>` into a `chrono::Duration`.
pub fn parse_window(window_str: &str) -> Result<Duration> {
    let bytes = window_str.as_bytes();
    let invalid = || {
        LogLensError::InvalidMetric(format!(
            "invalid window format: {window_str}. expected format: <number><unit> \
             (e.g., '5m', '1h', '30s')"
        ))
    };

    if bytes.is_empty() {
        return Err(invalid());
    }
    let unit = *bytes.last().unwrap() as char;
    let digits = &window_str[..window_str.len() - 1];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: i64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        's' => Ok(Duration::seconds(amount)),
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        _ => Err(invalid()),
    }
}

/// A declarative metric definition: name, predicate, aggregation, window, and
/// optional grouping/value-extraction. Value objects are immutable once built.
#[derive(Clone)]
pub struct MetricDef {
    pub name: String,
    pub predicate: Predicate,
    pub aggregation: AggregationKind,
    pub window: Duration,
    pub description: Option<String>,
    pub group_key: Option<GroupKeyFn>,
    pub value_extractor: Option<ValueExtractorFn>,
}

impl fmt::Debug for MetricDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricDef")
            .field("name", &self.name)
            .field("aggregation", &self.aggregation)
            .field("window", &self.window)
            .field("description", &self.description)
            .field("has_group_key", &self.group_key.is_some())
            .field("has_value_extractor", &self.value_extractor.is_some())
            .finish()
    }
}

impl MetricDef {
    /// Construct and validate a metric. Value-requiring aggregations without a
    /// `value_extractor` are *not* rejected here — per spec.md §4.2, that
    /// failure is deferred to aggregation time (`MetricConfigError`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        predicate: Predicate,
        aggregation: AggregationKind,
        window: Duration,
        description: Option<String>,
        group_key: Option<GroupKeyFn>,
        value_extractor: Option<ValueExtractorFn>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LogLensError::InvalidMetric(
                "metric name must be non-empty".to_string(),
            ));
        }
        if window <= Duration::zero() {
            return Err(LogLensError::InvalidMetric(
                "metric window must be a positive duration".to_string(),
            ));
        }
        Ok(Self {
            name,
            predicate,
            aggregation,
            window,
            description,
            group_key,
            value_extractor,
        })
    }

    /// Construct a metric from a window string (`"5m"`, `"1h"`, ...).
    #[allow(clippy::too_many_arguments)]
    pub fn from_window_str(
        name: impl Into<String>,
        predicate: Predicate,
        aggregation: AggregationKind,
        window_str: &str,
        description: Option<String>,
        group_key: Option<GroupKeyFn>,
        value_extractor: Option<ValueExtractorFn>,
    ) -> Result<Self> {
        let window = parse_window(window_str)?;
        Self::new(
            name,
            predicate,
            aggregation,
            window,
            description,
            group_key,
            value_extractor,
        )
    }
}

/// A bag of untyped supplementary data attached to a `MetricResult`.
pub type MetricMetadata = HashMap<String, Value>;

/// The outcome of one metric recomputation.
///
/// Exactly one of `value` (scalar) or `grouped` (key -> aggregate map) is
/// meaningful, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub metric_name: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub value: Option<f64>,
    pub grouped: Option<HashMap<String, Option<f64>>>,
    #[serde(default)]
    pub metadata: MetricMetadata,
}

impl MetricResult {
    pub fn scalar(
        metric_name: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        value: Option<f64>,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            window_start,
            window_end,
            value,
            grouped: None,
            metadata: HashMap::new(),
        }
    }

    pub fn grouped(
        metric_name: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        grouped: HashMap<String, Option<f64>>,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            window_start,
            window_end,
            value: None,
            grouped: Some(grouped),
            metadata: HashMap::new(),
        }
    }

    /// Serialize to the external mapping shape from spec.md §6:
    /// `{ metric, value, window_start, window_end, grouped?, metadata }`.
    pub fn to_map(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("metric".to_string(), Value::String(self.metric_name.clone()));
        map.insert(
            "window_start".to_string(),
            Value::String(self.window_start.to_rfc3339()),
        );
        map.insert(
            "window_end".to_string(),
            Value::String(self.window_end.to_rfc3339()),
        );
        if let Some(v) = self.value {
            map.insert("value".to_string(), serde_json::json!(v));
        } else {
            map.insert("value".to_string(), Value::Null);
        }
        if let Some(grouped) = &self.grouped {
            if !grouped.is_empty() {
                map.insert("grouped".to_string(), serde_json::json!(grouped));
            }
        }
        map.insert("metadata".to_string(), serde_json::json!(self.metadata));
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_window_accepts_all_units() {
        assert_eq!(parse_window("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_window("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_window("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_window("2d").unwrap(), Duration::days(2));
    }

    #[test]
    fn parse_window_rejects_malformed_strings() {
        assert!(parse_window("5").is_err());
        assert!(parse_window("m5").is_err());
        assert!(parse_window("5x").is_err());
        assert!(parse_window("").is_err());
    }

    #[test]
    fn percentile_requires_bounded_value() {
        assert!(AggregationKind::parse("percentile", None).is_err());
        assert!(AggregationKind::parse("percentile", Some(150.0)).is_err());
        assert!(AggregationKind::parse("percentile", Some(95.0)).is_ok());
    }

    #[test]
    fn value_requiring_aggregations_do_not_fail_at_construction() {
        // Per spec.md 4.2: missing value_extractor only fails at aggregation time.
        let metric = MetricDef::from_window_str(
            "avg_latency",
            Arc::new(|_| true),
            AggregationKind::Average,
            "5m",
            None,
            None,
            None,
        );
        assert!(metric.is_ok());
    }

    #[test]
    fn metric_result_to_map_has_exactly_one_of_value_or_grouped() {
        let now = Utc::now();
        let scalar = MetricResult::scalar("m", now, now, Some(3.0));
        let map = scalar.to_map();
        assert!(map.get("grouped").is_none());
        assert_eq!(map.get("value").unwrap(), &serde_json::json!(3.0));
    }
}
