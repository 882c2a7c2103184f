//! CLI command implementations.
//!
//! Grounded on `original_source/loglens/cli/main.py` (a `typer` app): the
//! same subcommands (`ingest`, `metrics list|show`, `query`, `anomalies`,
//! `stats`, `config init`) with the same flags, reimplemented with `clap`
//! derive and this crate's `colored`/`comfy-table` output idiom in place of
//! `rich`.

pub mod expr;

use crate::analytics::{AnomalyDetector, Severity, WindowProcessor};
use crate::common::config::LogLensConfig;
use crate::common::output::{print_error, print_header, print_info, print_kv, print_success, print_warning, FormattedTable};
use crate::database::query::QueryFacade;
use crate::database::Storage;
use crate::error::{LogLensError, Result};
use crate::pipeline::ingestion::{LogFormat, LogIngestor};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

const DEFAULT_DB: &str = "loglens.db";

#[derive(Parser, Debug)]
#[command(name = "loglens", about = "LogLens++ - streaming log analytics engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest logs from a file into the database
    Ingest {
        logfile: PathBuf,
        #[arg(long, short = 'd')]
        db: Option<String>,
        #[arg(long, short = 'f')]
        format: Option<String>,
        #[arg(long, short = 's')]
        source: Option<String>,
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Manage and view stored metrics
    Metrics {
        /// Action: list or show
        action: String,
        /// Metric name, required for `show`
        metric_name: Option<String>,
        #[arg(long, short = 'd', default_value = DEFAULT_DB)]
        db: String,
        #[arg(long, short = 'l', default_value_t = 10)]
        limit: u64,
    },
    /// Execute a SQL query against the database
    Query {
        sql: String,
        #[arg(long, short = 'd', default_value = DEFAULT_DB)]
        db: String,
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },
    /// Detect anomalies in stored metrics
    Anomalies {
        #[arg(long, short = 'm')]
        metric: Option<String>,
        #[arg(long, short = 'd')]
        db: Option<String>,
        #[arg(long, short = 'w')]
        window: Option<usize>,
        #[arg(long, short = 't')]
        threshold: Option<f64>,
        #[arg(long, short = 'l', default_value_t = 10)]
        limit: usize,
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Show database statistics
    Stats {
        #[arg(long, short = 'd', default_value = DEFAULT_DB)]
        db: String,
        #[arg(long, short = 'H', default_value_t = 24)]
        hours: i64,
    },
    /// Manage configuration files
    Config {
        /// Action: init
        action: String,
        #[arg(long, short = 'p', default_value = "loglens.yaml")]
        path: PathBuf,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest { logfile, db, format, source, config } => run_ingest(logfile, db, format, source, config),
        Command::Metrics { action, metric_name, db, limit } => run_metrics(&action, metric_name, &db, limit),
        Command::Query { sql, db, format } => run_query(&sql, &db, &format),
        Command::Anomalies { metric, db, window, threshold, limit, config } => {
            run_anomalies(metric, db, window, threshold, limit, config)
        }
        Command::Stats { db, hours } => run_stats(&db, hours),
        Command::Config { action, path } => run_config(&action, &path),
    }
}

fn run_ingest(logfile: PathBuf, db: Option<String>, format: Option<String>, source: Option<String>, config: Option<PathBuf>) -> Result<()> {
    if !logfile.exists() {
        print_error(&format!("log file not found: {}", logfile.display()));
        return Err(LogLensError::IngestionError(format!("log file not found: {}", logfile.display())));
    }

    let config_obj = match &config {
        Some(path) => Some(LogLensConfig::from_file(path)?),
        None => LogLensConfig::discover().ok(),
    };

    let db_path = db.or_else(|| config_obj.as_ref().map(|c| c.storage.db_path.clone())).unwrap_or_else(|| DEFAULT_DB.to_string());
    let default_source = source.or_else(|| config_obj.as_ref().map(|c| c.default_source.clone())).unwrap_or_else(|| "unknown".to_string());
    let default_level = config_obj.as_ref().map(|c| c.default_level.clone()).unwrap_or_else(|| "INFO".to_string());

    print_info(&format!("ingesting logs from: {}", logfile.display()));

    let log_format = format.map(|f| LogFormat::parse(&f)).transpose()?;
    let ingestor = LogIngestor::new(default_source, default_level, true);
    let (events, stats) = ingestor.ingest_file(&logfile, log_format)?;

    let storage = Storage::open(&db_path)?;
    storage.insert_events(&events)?;

    let mut metric_count = 0u64;
    if let Some(config_obj) = &config_obj {
        if !config_obj.metrics.is_empty() {
            print_info("computing metrics...");
            let metrics = config_obj.to_metrics()?;
            let mut processor = WindowProcessor::new(metrics)?;
            for event in &events {
                let updated = processor.add_event(event)?;
                for result in updated.values() {
                    storage.insert_metric(result)?;
                    metric_count += 1;
                }
            }
            print_success(&format!("computed {metric_count} metric values"));
        }
    }

    storage.close()?;
    print_success(&format!(
        "ingested {} events into {} ({} lines skipped)",
        stats.events_ingested, db_path, stats.lines_skipped
    ));
    Ok(())
}

fn run_metrics(action: &str, metric_name: Option<String>, db: &str, limit: u64) -> Result<()> {
    require_db(db)?;
    let storage = Storage::open(db)?;

    match action {
        "list" => {
            let facade = QueryFacade::new(&storage);
            let rows = facade.execute_sql(
                "SELECT DISTINCT metric_name, COUNT(*) as count, MIN(window_start) as first_seen, MAX(window_end) as last_seen \
                 FROM metrics GROUP BY metric_name ORDER BY metric_name",
                None,
            )?;
            if rows.is_empty() {
                print_warning("no metrics found in database");
                return storage.close();
            }
            let mut table = FormattedTable::new(vec!["Metric Name", "Count", "First Seen", "Last Seen"]);
            for row in rows {
                table.add_row(row.into_iter().map(|(_, v)| value_to_cell(&v)).collect());
            }
            table.print();
        }
        "show" => {
            let name = metric_name.ok_or_else(|| LogLensError::QueryError("metric name required for 'show' action".to_string()))?;
            let rows = storage.query_metrics(Some(&name), None, None, Some(limit))?;
            if rows.is_empty() {
                print_warning(&format!("no metrics found for: {name}"));
                return storage.close();
            }
            let mut table = FormattedTable::new(vec!["Window Start", "Window End", "Value", "Grouped Values"]);
            for m in rows {
                let value = m.value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string());
                let grouped = m
                    .grouped
                    .map(|g| serde_json::to_string(&g).unwrap_or_default())
                    .unwrap_or_else(|| "N/A".to_string());
                table.add_row(vec![
                    m.window_start.format("%Y-%m-%d %H:%M:%S").to_string(),
                    m.window_end.format("%Y-%m-%d %H:%M:%S").to_string(),
                    value,
                    grouped,
                ]);
            }
            table.print();
        }
        other => {
            print_error(&format!("unknown action: {other}"));
            print_info("available actions: list, show");
            return Err(LogLensError::QueryError(format!("unknown action: {other}")));
        }
    }

    storage.close()
}

fn run_query(sql: &str, db: &str, format: &str) -> Result<()> {
    require_db(db)?;
    let storage = Storage::open(db)?;
    let facade = QueryFacade::new(&storage);
    let rows = facade.execute_sql(sql, None)?;

    if rows.is_empty() {
        print_warning("no results");
        return storage.close();
    }

    if format == "json" {
        let as_json: Vec<serde_json::Map<String, serde_json::Value>> =
            rows.iter().map(|row| row.iter().cloned().collect()).collect();
        println!("{}", serde_json::to_string_pretty(&as_json)?);
    } else {
        let headers: Vec<&str> = rows[0].iter().map(|(k, _)| k.as_str()).collect();
        let mut table = FormattedTable::new(headers);
        for row in &rows {
            table.add_row(row.iter().map(|(_, v)| value_to_cell(v)).collect());
        }
        table.print();
        println!("\n{} row(s)", rows.len());
    }

    storage.close()
}

fn run_anomalies(
    metric: Option<String>,
    db: Option<String>,
    window: Option<usize>,
    threshold: Option<f64>,
    limit: usize,
    config: Option<PathBuf>,
) -> Result<()> {
    let config_obj = match &config {
        Some(path) => Some(LogLensConfig::from_file(path)?),
        None => LogLensConfig::discover().ok(),
    };
    let db_path = db.or_else(|| config_obj.as_ref().map(|c| c.storage.db_path.clone())).unwrap_or_else(|| DEFAULT_DB.to_string());
    require_db(&db_path)?;

    let storage = Storage::open(&db_path)?;
    let facade = QueryFacade::new(&storage);

    let metric_names: Vec<String> = if let Some(name) = metric {
        vec![name]
    } else {
        facade
            .execute_sql("SELECT DISTINCT metric_name FROM metrics", None)?
            .into_iter()
            .filter_map(|row| {
                row.into_iter()
                    .find(|(k, _)| k == "metric_name")
                    .and_then(|(_, v)| v.as_str().map(str::to_string))
            })
            .collect()
    };

    if metric_names.is_empty() {
        print_warning("no metrics found in database");
        return storage.close();
    }

    let mut all_anomalies = Vec::new();

    for name in metric_names {
        let anomaly_cfg = config_obj.as_ref().and_then(|c| c.anomaly_config_for(&name));
        let mut metrics_list = storage.query_metrics(Some(&name), None, None, Some((limit * 2) as u64))?;
        if metrics_list.len() < 5 {
            continue;
        }
        metrics_list.reverse();

        let (effective_window, effective_threshold) = match anomaly_cfg {
            Some(cfg) => (window.unwrap_or(cfg.window_size), threshold.unwrap_or(cfg.threshold)),
            None => (window.unwrap_or(20), threshold.unwrap_or(2.0)),
        };
        let mut detector = AnomalyDetector::new(name.clone(), effective_window, effective_threshold, 5);

        for m in metrics_list {
            let Some(value) = m.value else { continue };
            if let Some(anomaly) = detector.add_value(value, m.window_start) {
                all_anomalies.push(anomaly);
            }
        }
    }

    if all_anomalies.is_empty() {
        print_success("no anomalies detected");
        return storage.close();
    }

    print_header(&format!("detected {} anomaly(ies)", all_anomalies.len()));
    all_anomalies.sort_by_key(|a| (a.severity.sort_rank(), a.timestamp));

    let mut table = FormattedTable::new(vec!["Metric", "Timestamp", "Explanation", "Severity"]);
    for anomaly in all_anomalies.into_iter().take(limit) {
        let severity_text = match anomaly.severity {
            Severity::Critical => anomaly.severity.as_str().to_uppercase().bold().red().to_string(),
            Severity::High => anomaly.severity.as_str().to_uppercase().red().to_string(),
            Severity::Medium => anomaly.severity.as_str().to_uppercase().yellow().to_string(),
            Severity::Low => anomaly.severity.as_str().to_uppercase().dimmed().to_string(),
        };
        table.add_row(vec![
            anomaly.metric_name,
            anomaly.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            anomaly.explanation,
            severity_text,
        ]);
    }
    table.print();

    storage.close()
}

fn run_stats(db: &str, hours: i64) -> Result<()> {
    require_db(db)?;
    let storage = Storage::open(db)?;

    let end_time = Utc::now();
    let start_time = end_time - Duration::hours(hours);

    let event_stats = storage.get_event_stats(Some(start_time), Some(end_time))?;

    let facade = QueryFacade::new(&storage);
    let metric_rows = facade.execute_sql(&format!(
        "SELECT COUNT(DISTINCT metric_name) as metric_count, COUNT(*) as metric_values FROM metrics \
         WHERE window_start >= '{}' AND window_end <= '{}'",
        start_time.naive_utc(),
        end_time.naive_utc()
    ), None)?;

    print_header("LogLens++ Stats");
    print_kv(
        "Time Range",
        &format!("{} to {}", start_time.format("%Y-%m-%d %H:%M"), end_time.format("%Y-%m-%d %H:%M")),
    );
    print_kv("Total Events", &event_stats.total_events.to_string());
    print_kv("By Level", &format!("{:?}", event_stats.by_level));
    print_kv("By Source", &format!("{:?}", event_stats.by_source));
    if let Some(row) = metric_rows.first() {
        for (key, value) in row {
            print_kv(key, &value_to_cell(value));
        }
    }

    storage.close()
}

fn run_config(action: &str, path: &PathBuf) -> Result<()> {
    match action {
        "init" => {
            LogLensConfig::write_default(path)?;
            print_success(&format!("created default configuration at: {}", path.display()));
            Ok(())
        }
        other => {
            print_error(&format!("unknown action: {other}"));
            print_info("available actions: init");
            Err(LogLensError::IngestionError(format!("unknown config action: {other}")))
        }
    }
}

fn require_db(db: &str) -> Result<()> {
    if !std::path::Path::new(db).exists() {
        print_error(&format!("database not found: {db}"));
        return Err(LogLensError::StorageUnavailable(format!("database not found: {db}")));
    }
    Ok(())
}

fn value_to_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "N/A".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
