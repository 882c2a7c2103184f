//! The canonical log event record.

use crate::error::{LogLensError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Severity level of a log event, canonicalized to upper-case on construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Trace,
    Fatal,
}

impl Level {
    const ALL: [Level; 7] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
        Level::Trace,
        Level::Fatal,
    ];

    /// Parse a level token, case-insensitively. Fails with `InvalidEvent` listing
    /// the allowed set, matching `original_source`'s `VALID_LEVELS` error message.
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            "TRACE" => Ok(Level::Trace),
            "FATAL" => Ok(Level::Fatal),
            _ => Err(LogLensError::InvalidEvent(format!(
                "invalid level '{}', expected one of {:?}",
                raw,
                Level::ALL.map(|l| l.as_str())
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Trace => "TRACE",
            Level::Fatal => "FATAL",
        }
    }

    /// The three levels counted as "errors" by `queryErrorRateBySource`.
    pub fn is_error_class(&self) -> bool {
        matches!(self, Level::Error | Level::Critical | Level::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EventMetadata {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventMetadata {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = Option::<HashMap<String, Value>>::deserialize(deserializer)?;
        Ok(EventMetadata(map.unwrap_or_default()))
    }
}

/// A `string -> JSON value` metadata bag. Never null; an absent bag normalizes
/// to empty, matching spec.md's "metadata never null" invariant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMetadata(pub HashMap<String, Value>);

impl EventMetadata {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for EventMetadata {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

/// The canonical normalized log event.
///
/// Construction validates: level is drawn from the allowed set (canonicalized
/// upper-case), source and message are non-empty after trim, metadata is a
/// mapping (defaulting to empty). Equality is structural.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Construct and validate a new event. Fails with `InvalidEvent` on any
    /// violation of source/message non-emptiness.
    pub fn new(
        timestamp: DateTime<Utc>,
        level: Level,
        source: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Self> {
        let source = source.into();
        let message = message.into();

        if source.trim().is_empty() {
            return Err(LogLensError::InvalidEvent(
                "source must be a non-empty string".to_string(),
            ));
        }
        if message.trim().is_empty() {
            return Err(LogLensError::InvalidEvent(
                "message must be a non-empty string".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            level,
            source,
            message,
            metadata: EventMetadata(metadata.unwrap_or_default()),
        })
    }

    /// Construct from raw string fields, parsing `level` via [`Level::parse`].
    pub fn from_parts(
        timestamp: DateTime<Utc>,
        level: &str,
        source: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Self> {
        Self::new(timestamp, Level::parse(level)?, source, message, metadata)
    }

    /// Round-trip to a plain JSON value (name -> value mapping).
    pub fn to_map(&self) -> Value {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "level": self.level.as_str(),
            "source": self.source,
            "message": self.message,
            "metadata": self.metadata.0,
        })
    }

    /// Construct an `Event` back out of the mapping produced by [`Event::to_map`].
    pub fn from_map(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            LogLensError::InvalidEvent("event mapping must be a JSON object".to_string())
        })?;

        let timestamp_raw = obj
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| LogLensError::InvalidEvent("missing 'timestamp' field".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp_raw)
            .map_err(|e| LogLensError::InvalidEvent(format!("invalid timestamp: {e}")))?
            .with_timezone(&Utc);

        let level_raw = obj
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("INFO");

        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| LogLensError::InvalidEvent("missing 'source' field".to_string()))?;
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| LogLensError::InvalidEvent("missing 'message' field".to_string()))?;

        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.clone().into_iter().collect::<HashMap<_, _>>());

        Self::from_parts(timestamp, level_raw, source, message, metadata)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.timestamp.to_rfc3339(),
            self.level,
            self.source,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parse_is_case_insensitive() {
        assert_eq!(Level::parse("error").unwrap(), Level::Error);
        assert_eq!(Level::parse("ERROR").unwrap(), Level::Error);
        assert_eq!(Level::parse("  Warning ").unwrap(), Level::Warning);
    }

    #[test]
    fn level_parse_rejects_unknown() {
        assert!(Level::parse("NOTICE").is_err());
    }

    #[test]
    fn event_requires_non_empty_source_and_message() {
        let ts = Utc::now();
        assert!(Event::new(ts, Level::Info, "", "hello", None).is_err());
        assert!(Event::new(ts, Level::Info, "app", "  ", None).is_err());
        assert!(Event::new(ts, Level::Info, "app", "hello", None).is_ok());
    }

    #[test]
    fn event_metadata_defaults_to_empty_not_null() {
        let ts = Utc::now();
        let event = Event::new(ts, Level::Info, "app", "hello", None).unwrap();
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn event_round_trips_through_map() {
        let ts = Utc::now();
        let event = Event::new(ts, Level::Error, "app", "boom", None).unwrap();
        let map = event.to_map();
        let restored = Event::from_map(&map).unwrap();
        assert_eq!(event.level, restored.level);
        assert_eq!(event.source, restored.source);
        assert_eq!(event.message, restored.message);
    }
}
