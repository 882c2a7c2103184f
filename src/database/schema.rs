//! DDL for the two tables backing a LogLens++ store, grounded on
//! `original_source/loglens/storage/database.py`'s literal schema.

pub const CREATE_EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS events (
    id BIGINT PRIMARY KEY,
    timestamp TIMESTAMP NOT NULL,
    level VARCHAR NOT NULL,
    source VARCHAR NOT NULL,
    message VARCHAR NOT NULL,
    metadata_json VARCHAR,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

pub const CREATE_EVENTS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_events_level ON events(level)",
    "CREATE INDEX IF NOT EXISTS idx_events_source ON events(source)",
];

pub const CREATE_METRICS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id BIGINT PRIMARY KEY,
    metric_name VARCHAR NOT NULL,
    window_start TIMESTAMP NOT NULL,
    window_end TIMESTAMP NOT NULL,
    value DOUBLE,
    grouped_values_json VARCHAR,
    metadata_json VARCHAR,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

pub const CREATE_METRICS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(metric_name)",
    "CREATE INDEX IF NOT EXISTS idx_metrics_window ON metrics(window_start, window_end)",
    "CREATE INDEX IF NOT EXISTS idx_metrics_name_window ON metrics(metric_name, window_start, window_end)",
];
