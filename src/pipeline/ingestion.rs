//! File- and stream-based log ingestion with JSON/text format auto-detection.
//!
//! Grounded on `original_source/loglens/ingestion/ingestor.py`: same
//! extension + content-sniffing format detection, same timestamp/level/
//! source heuristics for unstructured text. Unlike the original, a single
//! pass over the input both returns events and lets the caller fold them
//! into metric windows and storage — see SPEC_FULL.md's ingest-command
//! section for why the double-read is not carried over.

use crate::error::{LogLensError, Result};
use crate::schemas::event::{Event, Level};
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{instrument, warn};

/// Log format, either requested explicitly or auto-detected from content.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(LogLensError::IngestionError(format!(
                "unsupported format: {other}. use 'json' or 'text'"
            ))),
        }
    }
}

impl std::fmt::Debug for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Text => write!(f, "text"),
        }
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestionStats {
    pub events_ingested: u64,
    pub lines_skipped: u64,
}

static TIMESTAMP_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)").unwrap()
});
static TIMESTAMP_STANDARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)").unwrap());
static TIMESTAMP_UNIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{10}(?:\.\d+)?)\b").unwrap());
static LEVEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(DEBUG|INFO|WARNING|ERROR|CRITICAL|TRACE|FATAL)\b").unwrap());
static BRACKET_SOURCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[\(]([a-zA-Z0-9_-]+)[\]\)]").unwrap());
static COLON_SOURCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9_-]+):").unwrap());

/// Ingests log lines from files or in-memory strings, yielding [`Event`]s.
pub struct LogIngestor {
    default_source: String,
    default_level: String,
    skip_invalid: bool,
}

impl LogIngestor {
    pub fn new(default_source: impl Into<String>, default_level: impl Into<String>, skip_invalid: bool) -> Self {
        Self {
            default_source: default_source.into(),
            default_level: default_level.into(),
            skip_invalid,
        }
    }

    /// Read and parse an entire file, auto-detecting format unless one is given.
    #[instrument(skip(self))]
    pub fn ingest_file(&self, path: impl AsRef<Path>, format: Option<LogFormat>) -> Result<(Vec<Event>, IngestionStats)> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| LogLensError::IngestionError(format!("failed to read {}: {e}", path.display())))?;

        let format = format.unwrap_or_else(|| self.detect_format(path, &content));
        self.ingest_str(&content, format)
    }

    /// Parse an in-memory string using the given format.
    pub fn ingest_str(&self, content: &str, format: LogFormat) -> Result<(Vec<Event>, IngestionStats)> {
        match format {
            LogFormat::Json => self.ingest_json(content),
            LogFormat::Text => self.ingest_text(content),
        }
    }

    fn ingest_json(&self, content: &str) -> Result<(Vec<Event>, IngestionStats)> {
        let mut events = Vec::new();
        let mut stats = IngestionStats::default();

        for (line_no, line) in content.lines().enumerate() {
            let line_no = line_no + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.parse_json_line(line) {
                Ok(event) => {
                    events.push(event);
                    stats.events_ingested += 1;
                }
                Err(e) => {
                    if self.skip_invalid {
                        stats.lines_skipped += 1;
                        warn!(line_no, error = %e, "skipping invalid log line");
                    } else {
                        return Err(LogLensError::IngestionError(format!("error parsing line {line_no}: {e}")));
                    }
                }
            }
        }

        Ok((events, stats))
    }

    fn parse_json_line(&self, line: &str) -> Result<Event> {
        let data: Value = serde_json::from_str(line)?;
        let obj = data
            .as_object()
            .ok_or_else(|| LogLensError::InvalidEvent("log line is not a JSON object".to_string()))?;

        let timestamp = match obj.get("timestamp") {
            Some(v) => parse_timestamp_value(v)?,
            None => Utc::now(),
        };
        let level = obj
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_level)
            .to_string();
        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_source)
            .to_string();
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string());

        let mut metadata: HashMap<String, Value> = obj
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        const KNOWN: &[&str] = &["timestamp", "level", "source", "message", "metadata"];
        for (key, value) in obj {
            if !KNOWN.contains(&key.as_str()) {
                metadata.insert(key.clone(), value.clone());
            }
        }

        Event::from_parts(timestamp, &level, source, message, Some(metadata))
    }

    fn ingest_text(&self, content: &str) -> Result<(Vec<Event>, IngestionStats)> {
        let mut events = Vec::new();
        let mut stats = IngestionStats::default();

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            match self.parse_text_line(line, line_no) {
                Ok(event) => {
                    events.push(event);
                    stats.events_ingested += 1;
                }
                Err(e) => {
                    if self.skip_invalid {
                        stats.lines_skipped += 1;
                        warn!(line_no, error = %e, "skipping unparseable log line");
                    } else {
                        return Err(LogLensError::IngestionError(format!("error parsing line {line_no}: {e}")));
                    }
                }
            }
        }

        Ok((events, stats))
    }

    fn parse_text_line(&self, line: &str, line_no: usize) -> Result<Event> {
        let mut removed_ranges: Vec<(usize, usize)> = Vec::new();

        let timestamp = if let Some(m) = TIMESTAMP_ISO.find(line).or_else(|| TIMESTAMP_STANDARD.find(line)) {
            removed_ranges.push((m.start(), m.end()));
            parse_text_timestamp(m.as_str()).unwrap_or_else(Utc::now)
        } else if let Some(m) = TIMESTAMP_UNIX.find(line) {
            removed_ranges.push((m.start(), m.end()));
            m.as_str()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
                .unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        let level = if let Some(m) = LEVEL_PATTERN.find(line) {
            removed_ranges.push((m.start(), m.end()));
            m.as_str().to_uppercase()
        } else {
            self.default_level.clone()
        };

        let search_start = removed_ranges.iter().map(|(_, end)| *end).max().unwrap_or(0);
        let tail = &line[search_start.min(line.len())..];
        let source = if let Some(m) = BRACKET_SOURCE.captures(tail) {
            let whole = m.get(0).unwrap();
            removed_ranges.push((search_start + whole.start(), search_start + whole.end()));
            m.get(1).unwrap().as_str().to_string()
        } else if let Some(m) = COLON_SOURCE.captures(tail) {
            let text = m.get(1).unwrap().as_str();
            if !text.chars().all(|c| c.is_ascii_digit()) && !text.contains('T') {
                let whole = m.get(0).unwrap();
                removed_ranges.push((search_start + whole.start(), search_start + whole.end()));
                text.to_string()
            } else {
                self.default_source.clone()
            }
        } else {
            self.default_source.clone()
        };

        let message = extract_message(line, &removed_ranges);

        let mut metadata = HashMap::new();
        metadata.insert("line_number".to_string(), Value::from(line_no));
        metadata.insert("raw_line".to_string(), Value::from(line));

        Event::from_parts(timestamp, &level, source, message, Some(metadata))
    }

    fn detect_format(&self, path: &Path, content: &str) -> LogFormat {
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("json") | Some("jsonl") => return LogFormat::Json,
            Some("log") | None => {}
            Some(_) => return LogFormat::Text,
        }
        detect_format_from_content(content)
    }
}

fn detect_format_from_content(content: &str) -> LogFormat {
    let lines: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).take(5).collect();
    if lines.is_empty() {
        return LogFormat::Text;
    }
    let json_count = lines.iter().filter(|l| serde_json::from_str::<Value>(l).is_ok()).count();
    if json_count as f64 >= lines.len() as f64 * 0.8 {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn parse_timestamp_value(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_text_timestamp(s).ok_or_else(|| LogLensError::InvalidEvent(format!("unparseable timestamp: {s}"))),
        Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| LogLensError::InvalidEvent("invalid numeric timestamp".to_string()))?;
            Utc.timestamp_opt(secs as i64, 0)
                .single()
                .ok_or_else(|| LogLensError::InvalidEvent(format!("out-of-range timestamp: {secs}")))
        }
        Value::Null => Ok(Utc::now()),
        other => Err(LogLensError::InvalidEvent(format!("unsupported timestamp value: {other}"))),
    }
}

fn parse_text_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return Utc.timestamp_opt(secs as i64, 0).single();
    }
    None
}

fn extract_message(line: &str, removed: &[(usize, usize)]) -> String {
    let mut ranges = removed.to_vec();
    ranges.sort_by_key(|(start, _)| *start);

    let mut message = String::new();
    let mut last_end = 0;
    for (start, end) in &ranges {
        if *start > last_end {
            message.push_str(&line[last_end..*start]);
        }
        last_end = (*end).max(last_end);
    }
    if last_end < line.len() {
        message.push_str(&line[last_end..]);
    }

    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_start_matches([':', '-', ' ']).trim().to_string();

    if trimmed.is_empty() {
        line.trim().to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor() -> LogIngestor {
        LogIngestor::new("unknown", "INFO", true)
    }

    #[test]
    fn detects_and_parses_json_lines() {
        let content = "{\"timestamp\": \"2024-01-01T12:00:00Z\", \"level\": \"ERROR\", \"source\": \"app\", \"message\": \"boom\"}\n";
        let (events, stats) = ingestor().ingest_str(content, LogFormat::Json).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(stats.events_ingested, 1);
        assert_eq!(events[0].level, Level::Error);
        assert_eq!(events[0].source, "app");
    }

    #[test]
    fn json_extra_fields_fold_into_metadata() {
        let content = "{\"message\": \"hi\", \"request_id\": \"abc123\"}\n";
        let (events, _) = ingestor().ingest_str(content, LogFormat::Json).unwrap();
        assert_eq!(events[0].metadata.get("request_id").unwrap(), &Value::from("abc123"));
    }

    #[test]
    fn text_line_extracts_timestamp_level_and_bracket_source() {
        let content = "2024-01-01 12:00:00 ERROR [payments] card declined\n";
        let (events, _) = ingestor().ingest_str(content, LogFormat::Text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::Error);
        assert_eq!(events[0].source, "payments");
        assert!(events[0].message.contains("card declined"));
    }

    #[test]
    fn invalid_json_line_is_skipped_when_lenient() {
        let content = "not json at all\n{\"message\": \"ok\"}\n";
        let (events, stats) = ingestor().ingest_str(content, LogFormat::Json).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(stats.lines_skipped, 1);
    }

    #[test]
    fn strict_mode_fails_on_first_invalid_line() {
        let strict = LogIngestor::new("unknown", "INFO", false);
        let content = "not json at all\n";
        let err = strict.ingest_str(content, LogFormat::Json).unwrap_err();
        assert!(matches!(err, LogLensError::IngestionError(_)));
    }

    #[test]
    fn content_sniffing_detects_majority_json() {
        let content = "{\"message\": \"a\"}\n{\"message\": \"b\"}\n{\"message\": \"c\"}\n";
        assert_eq!(detect_format_from_content(content), LogFormat::Json);
    }

    #[test]
    fn content_sniffing_detects_text() {
        let content = "plain line one\nplain line two\n";
        assert_eq!(detect_format_from_content(content), LogFormat::Text);
    }
}
