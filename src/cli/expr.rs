//! A minimal expression evaluator for metric `filter` / `group_by` /
//! `value_extractor` config fields.
//!
//! `original_source/loglens/utils/config.py` compiles these with Python's
//! `compile()`/`eval()` against a restricted namespace (`event`, plus a
//! handful of builtins), which lets a config author write essentially any
//! Python boolean/string/numeric expression. Replicating a general
//! expression language is out of scope here (see DESIGN.md); this module
//! instead supports exactly the shapes the shipped default config and
//! spec.md's examples use:
//!
//!   - `true`
//!   - `event.level == "LEVEL"`
//!   - `event.level != "LEVEL"`
//!   - `event.level in ("A", "B", "C")`
//!   - `event.source == "NAME"`
//!   - `event.source`
//!   - `event.level`
//!   - `event.metadata["key"]`
//!
//! Anything outside that grammar is a parse error naming the offending text,
//! not a silent partial match.

use crate::models::metric::{GroupKeyFn, Predicate, ValueExtractorFn};
use crate::schemas::event::Event;
use std::sync::Arc;

/// A parsed, field-addressable expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    True,
    FieldEq { field: Field, value: String },
    FieldNotEq { field: Field, value: String },
    FieldIn { field: Field, values: Vec<String> },
    Field(Field),
}

/// The event field an expression reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Level,
    Source,
    Message,
    Metadata(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot parse expression '{0}'")]
pub struct ParseError(pub String);

/// Parse an expression string into an [`Expr`].
pub fn parse(raw: &str) -> Result<Expr, ParseError> {
    let s = raw.trim();

    if s == "true" {
        return Ok(Expr::True);
    }

    if let Some(field) = parse_bare_field(s) {
        return Ok(Expr::Field(field));
    }

    if let Some((field_str, rest)) = s.split_once("==") {
        let field = parse_field(field_str.trim()).ok_or_else(|| ParseError(raw.to_string()))?;
        let value = parse_string_literal(rest.trim()).ok_or_else(|| ParseError(raw.to_string()))?;
        return Ok(Expr::FieldEq { field, value });
    }

    if let Some((field_str, rest)) = s.split_once("!=") {
        let field = parse_field(field_str.trim()).ok_or_else(|| ParseError(raw.to_string()))?;
        let value = parse_string_literal(rest.trim()).ok_or_else(|| ParseError(raw.to_string()))?;
        return Ok(Expr::FieldNotEq { field, value });
    }

    if let Some(idx) = s.find(" in ") {
        let (field_str, rest) = s.split_at(idx);
        let field = parse_field(field_str.trim()).ok_or_else(|| ParseError(raw.to_string()))?;
        let rest = rest[" in ".len()..].trim();
        let values = parse_tuple_literal(rest).ok_or_else(|| ParseError(raw.to_string()))?;
        return Ok(Expr::FieldIn { field, values });
    }

    Err(ParseError(raw.to_string()))
}

fn parse_field(s: &str) -> Option<Field> {
    match s {
        "event.level" => Some(Field::Level),
        "event.source" => Some(Field::Source),
        "event.message" => Some(Field::Message),
        _ => {
            let key = s.strip_prefix("event.metadata[")?.strip_suffix(']')?;
            parse_string_literal(key.trim()).map(Field::Metadata)
        }
    }
}

fn parse_bare_field(s: &str) -> Option<Field> {
    parse_field(s)
}

fn parse_string_literal(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() >= 2 && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''))) {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

fn parse_tuple_literal(s: &str) -> Option<Vec<String>> {
    let s = s.trim();
    let inner = s.strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| parse_string_literal(part.trim()))
        .collect()
}

/// Render a metadata value the way a config author would expect to compare
/// it against a string literal: bare strings unquoted, everything else as
/// its JSON text. A missing key reads as an empty string.
fn metadata_as_string(event: &Event, key: &str) -> String {
    match event.metadata.get(key) {
        None => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn read_field(event: &Event, field: &Field) -> String {
    match field {
        Field::Level => event.level.as_str().to_string(),
        Field::Source => event.source.clone(),
        Field::Message => event.message.clone(),
        Field::Metadata(key) => metadata_as_string(event, key),
    }
}

/// Compile an [`Expr`] into a boolean predicate over [`Event`]s.
pub fn compile_predicate(expr: Expr) -> Predicate {
    Arc::new(move |event: &Event| match &expr {
        Expr::True => true,
        Expr::FieldEq { field, value } => &read_field(event, field) == value,
        Expr::FieldNotEq { field, value } => &read_field(event, field) != value,
        Expr::FieldIn { field, values } => values.contains(&read_field(event, field)),
        Expr::Field(field) => !read_field(event, field).is_empty(),
    })
}

/// Compile an [`Expr`] into a group-key function over [`Event`]s.
pub fn compile_group_key(expr: Expr) -> GroupKeyFn {
    Arc::new(move |event: &Event| match &expr {
        Expr::Field(field) => read_field(event, field),
        other => format!("{other:?}"),
    })
}

/// Compile an [`Expr`] into a numeric value extractor over [`Event`]s.
///
/// `event.metadata["key"]` reads the stored JSON number directly; a bare
/// field falls back to parsing its string form as a float.
pub fn compile_value_extractor(expr: Expr) -> ValueExtractorFn {
    Arc::new(move |event: &Event| match &expr {
        Expr::Field(Field::Metadata(key)) => match event.metadata.get(key) {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        },
        Expr::Field(field) => read_field(event, field).parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::event::Level;

    fn sample_event(level: Level, source: &str) -> Event {
        Event::new(chrono::Utc::now(), level, source, "hello", None).unwrap()
    }

    #[test]
    fn parses_true_literal() {
        assert_eq!(parse("true").unwrap(), Expr::True);
    }

    #[test]
    fn parses_equality_on_level() {
        let expr = parse("event.level == \"ERROR\"").unwrap();
        assert_eq!(
            expr,
            Expr::FieldEq {
                field: Field::Level,
                value: "ERROR".to_string()
            }
        );
        let predicate = compile_predicate(expr);
        assert!(predicate(&sample_event(Level::Error, "app")));
        assert!(!predicate(&sample_event(Level::Info, "app")));
    }

    #[test]
    fn parses_in_list_on_level() {
        let expr = parse("event.level in (\"ERROR\", \"CRITICAL\")").unwrap();
        let predicate = compile_predicate(expr);
        assert!(predicate(&sample_event(Level::Critical, "app")));
        assert!(!predicate(&sample_event(Level::Warning, "app")));
    }

    #[test]
    fn bare_field_compiles_to_group_key() {
        let expr = parse("event.source").unwrap();
        let group_key = compile_group_key(expr);
        assert_eq!(group_key(&sample_event(Level::Info, "app1")), "app1");
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse("event.level.startswith('E')").is_err());
    }

    #[test]
    fn metadata_field_compiles_into_predicate_and_extractor() {
        let mut event = sample_event(Level::Info, "app");
        event.metadata.insert("status_code", serde_json::json!(500));

        let expr = parse("event.metadata[\"status_code\"] == \"500\"").unwrap();
        assert!(compile_predicate(expr)(&event));

        let extractor = compile_value_extractor(parse("event.metadata[\"status_code\"]").unwrap());
        assert_eq!(extractor(&event), 500.0);

        let missing = compile_value_extractor(parse("event.metadata[\"missing\"]").unwrap());
        assert_eq!(missing(&event), 0.0);
    }
}
