//! Log ingestion.

pub mod ingestion;

pub use ingestion::{IngestionStats, LogFormat, LogIngestor};
