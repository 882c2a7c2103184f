//! End-to-end coverage: ingest a log file, compute metrics, persist to
//! storage, and query the results back out.

use chrono::{Duration, Utc};
use loglens::analytics::{AnomalyDetector, WindowProcessor};
use loglens::database::query::QueryFacade;
use loglens::database::Storage;
use loglens::models::metric::{AggregationKind, MetricDef};
use loglens::pipeline::ingestion::{LogFormat, LogIngestor};
use loglens::schemas::Level;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn ingest_json_lines_and_persist_events() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("app.jsonl");
    let base = Utc::now() - Duration::minutes(10);

    let mut content = String::new();
    for i in 0..20 {
        let ts = base + Duration::seconds(i * 10);
        let level = if i % 4 == 0 { "ERROR" } else { "INFO" };
        content.push_str(&format!(
            "{{\"timestamp\": \"{}\", \"level\": \"{}\", \"source\": \"checkout\", \"message\": \"event {}\"}}\n",
            ts.to_rfc3339(),
            level,
            i
        ));
    }
    std::fs::write(&log_path, content).unwrap();

    let ingestor = LogIngestor::new("unknown", "INFO", true);
    let (events, stats) = ingestor.ingest_file(&log_path, Some(LogFormat::Json)).unwrap();
    assert_eq!(events.len(), 20);
    assert_eq!(stats.events_ingested, 20);

    let db_path = dir.path().join("loglens.db");
    let storage = Storage::open(&db_path).unwrap();
    let ids = storage.insert_events(&events).unwrap();
    assert_eq!(ids.len(), 20);

    let persisted = storage.query_events(None, None, None, None, None).unwrap();
    assert_eq!(persisted.len(), 20);

    let errors_only = storage.query_events(None, None, Some("ERROR"), None, None).unwrap();
    assert_eq!(errors_only.len(), 5);

    storage.close().unwrap();
}

#[test]
fn window_processor_feeds_storage_and_query_facade() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("loglens.db");
    let storage = Storage::open(&db_path).unwrap();

    let metric = MetricDef::new(
        "error_count",
        Arc::new(|e: &loglens::schemas::Event| e.level == Level::Error),
        AggregationKind::Count,
        Duration::minutes(5),
        None,
        None,
        None,
    )
    .unwrap();
    let mut processor = WindowProcessor::new(vec![metric]).unwrap();

    let base = Utc::now() - Duration::minutes(20);
    for i in 0..10 {
        let ts = base + Duration::seconds(i * 30);
        let level = if i % 2 == 0 { Level::Error } else { Level::Info };
        let event = loglens::schemas::Event::new(ts, level, "checkout", "boom", None).unwrap();
        let updated = processor.add_event(&event).unwrap();
        for result in updated.values() {
            storage.insert_metric(result).unwrap();
        }
    }

    let stored = storage.query_metrics(Some("error_count"), None, None, None).unwrap();
    assert!(!stored.is_empty());

    let facade = QueryFacade::new(&storage);
    let tables = facade.list_tables().unwrap();
    assert!(tables.iter().any(|t| t == "metrics"));

    storage.close().unwrap();
}

#[test]
fn anomaly_detector_flags_spike_in_metric_history() {
    let mut detector = AnomalyDetector::new("error_count", 20, 2.0, 5);
    let base = Utc::now();

    let baseline = [10.0, 12.0, 11.0, 13.0, 10.0, 12.0, 11.0, 10.0, 12.0, 11.0];
    for (i, value) in baseline.iter().enumerate() {
        let ts = base + Duration::minutes(i as i64);
        assert!(detector.add_value(*value, ts).is_none());
    }

    let spike_ts = base + Duration::minutes(baseline.len() as i64);
    let anomaly = detector.add_value(40.0, spike_ts).expect("spike should be flagged");
    assert!(anomaly.z_score > 2.0);
    assert!(anomaly.explanation.contains("error_count"));
}
