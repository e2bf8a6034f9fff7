//! Entry serializer: console arguments to sink records
//!
//! Every function here is total. Whatever shape an argument has, the result
//! is a string; failures degrade to a text placeholder instead of
//! propagating.

use super::arg::{Arg, ErrorArg, StructuredValue};
use super::log_entry::LogRecord;
use super::log_level::LogLevel;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

/// Builds [`LogRecord`]s, stamping each with the static metadata blob.
#[derive(Debug, Clone, Default)]
pub struct EntrySerializer {
    metadata: Option<String>,
}

impl EntrySerializer {
    /// `metadata` is serialized once here; every record shares the result.
    pub fn new(metadata: Option<&Value>) -> Self {
        Self {
            metadata: metadata.map(Value::to_string),
        }
    }

    pub fn serialize(&self, level: LogLevel, args: &[Arg]) -> LogRecord {
        self.serialize_at(level, args, Utc::now())
    }

    pub fn serialize_at(&self, level: LogLevel, args: &[Arg], now: DateTime<Utc>) -> LogRecord {
        serialize(level, args, now, self.metadata.as_deref())
    }
}

/// Build a record for one console call.
pub fn serialize(
    level: LogLevel,
    args: &[Arg],
    now: DateTime<Utc>,
    metadata: Option<&str>,
) -> LogRecord {
    let record = LogRecord::new(
        format_timestamp(&now),
        level,
        format_message(args),
        serialize_args(args),
    );
    match metadata {
        Some(metadata) => record.with_metadata(metadata),
        None => record,
    }
}

/// `2025-01-08T10:30:45.123Z`
pub fn format_timestamp(now: &DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Space-joined text form of the arguments.
pub fn format_message(args: &[Arg]) -> String {
    args.iter()
        .map(message_text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// JSON array text of the normalized arguments.
pub fn serialize_args(args: &[Arg]) -> String {
    Value::Array(args.iter().map(normalize_arg).collect()).to_string()
}

fn message_text(arg: &Arg) -> String {
    match arg {
        Arg::Null => "null".to_string(),
        Arg::Bool(b) => b.to_string(),
        Arg::Int(i) => i.to_string(),
        Arg::Float(f) => float_text(*f),
        Arg::Str(s) => s.clone(),
        Arg::Error(e) => e.to_string(),
        Arg::Structured(value) => match value.to_json() {
            Ok(json) => json.to_string(),
            Err(_) => placeholder(value.as_ref()),
        },
        Arg::Opaque(text) => text.clone(),
    }
}

pub(crate) fn normalize_arg(arg: &Arg) -> Value {
    match arg {
        Arg::Null => Value::Null,
        Arg::Bool(b) => Value::Bool(*b),
        Arg::Int(i) => Value::from(*i),
        // Non-finite floats have no JSON form
        Arg::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Arg::Str(s) => Value::String(s.clone()),
        Arg::Error(e) => error_value(e),
        Arg::Structured(value) => value
            .to_json()
            .unwrap_or_else(|_| Value::String(placeholder(value.as_ref()))),
        Arg::Opaque(text) => Value::String(text.clone()),
    }
}

fn error_value(e: &ErrorArg) -> Value {
    json!({
        "name": e.name,
        "message": e.message,
        "stack": e.stack,
    })
}

fn placeholder(value: &dyn StructuredValue) -> String {
    format!("{:?}", value)
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}
