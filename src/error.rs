//! Crate-wide error types.

use thiserror::Error;

/// Errors produced by the core analytics engine and its storage layer.
#[derive(Debug, Error)]
pub enum LogLensError {
    /// An `Event` failed validation at construction time.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A `MetricDef` failed validation at construction time.
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    /// An aggregation that requires a `valueExtractor` was applied without one.
    #[error("metric config error: {0}")]
    MetricConfigError(String),

    /// The storage engine could not be opened, connected to, or is already closed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The storage engine rejected a SQL statement or its bindings.
    #[error("query error: {0}")]
    QueryError(String),

    /// A line from the ingestion collaborator was malformed in strict mode.
    #[error("ingestion error: {0}")]
    IngestionError(String),

    /// Passthrough from the embedded database engine.
    #[error(transparent)]
    Database(#[from] duckdb::Error),

    /// Passthrough from filesystem / stream I/O.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Passthrough from JSON (de)serialization.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Passthrough from YAML (de)serialization.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, LogLensError>;
