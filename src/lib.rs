//! LogLens++
//!
//! A streaming log analytics engine: ingest structured or unstructured log
//! lines, compute declarative time-windowed metrics over them, flag
//! statistical anomalies with human-readable explanations, and query
//! everything back out of a columnar embedded store with SQL.
//!
//! # Overview
//!
//! This crate provides:
//! - **Event Schemas**: a normalized log event with level, source, message, metadata
//! - **Metric Models**: declarative predicate/aggregation/window metric definitions
//! - **Window Processor**: sliding time-window metric computation over a live event stream
//! - **Anomaly Detection**: rolling-window z-score detection with generated explanations
//! - **Storage**: an embedded columnar database (events + metrics tables)
//! - **Query Facade**: BI-friendly SQL passthrough and canned time-bucketed reports
//! - **Ingestion**: file/stream log ingestion with JSON/text format auto-detection
//! - **CLI**: `ingest`, `metrics`, `query`, `anomalies`, `stats`, `config` subcommands
//!
//! # Example
//!
//! ```rust
//! use loglens::models::metric::{AggregationKind, MetricDef};
//! use loglens::analytics::WindowProcessor;
//! use std::sync::Arc;
//!
//! let metric = MetricDef::from_window_str(
//!     "error_count",
//!     Arc::new(|e: &loglens::schemas::Event| e.level.is_error_class()),
//!     AggregationKind::Count,
//!     "5m",
//!     None,
//!     None,
//!     None,
//! ).unwrap();
//!
//! let mut processor = WindowProcessor::new(vec![metric]).unwrap();
//! ```

pub mod error;

pub mod schemas {
    //! The normalized log event schema.

    pub mod event;
    pub use event::{Event, EventMetadata, Level};
}

pub mod models {
    //! Declarative metric definitions and their computed results.

    pub mod metric;
    pub use metric::{AggregationKind, CustomAggregationFn, GroupKeyFn, MetricDef, MetricMetadata, MetricResult, Predicate, ValueExtractorFn};
}

pub mod analytics;
pub mod database;
pub mod pipeline;
pub mod common;
pub mod cli;

pub use analytics::{Anomaly, AnomalyDetector, AnomalyType, BaselineStats, MultiMetricAnomalyDetector, Severity, WindowProcessor};
pub use database::{EventStats, MetricSummary, PersistedEvent, PersistedMetric, Storage};
pub use error::{LogLensError, Result};
pub use schemas::{Event, EventMetadata, Level};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema version for data compatibility
pub const SCHEMA_VERSION: &str = "1.0.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constants_are_set() {
        assert!(!VERSION.is_empty());
        assert_eq!(SCHEMA_VERSION, "1.0.0");
    }
}
