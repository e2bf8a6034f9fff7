//! Arguments passed to a console entry point
//!
//! A console call is variadic and heterogeneous, so each argument is
//! resolved into one of a small set of shapes:
//! - primitives (`Null`, `Bool`, `Int`, `Float`, `Str`)
//! - error-like values carrying a name, message and stack text
//! - structured values that are serialized lazily when a record is built
//! - opaque values that only have a text form

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A value that can be rendered as structured JSON.
///
/// Implemented for every `Serialize + Debug` type. Serialization may fail
/// (for instance a self-referential graph whose `Serialize` impl bails out);
/// callers fall back to the `Debug` text in that case.
pub trait StructuredValue: fmt::Debug + Send + Sync {
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> StructuredValue for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Error-like argument, normalized to the three fields the sink stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorArg {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ErrorArg {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack = format!("{}: {}", name, message);
        Self {
            name,
            message,
            stack,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Build from any `std::error::Error`, walking its source chain for the
    /// stack text.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let name = short_type_name(std::any::type_name::<E>());
        let message = err.to_string();

        let mut stack = format!("{}: {}", name, message);
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            name,
            message,
            stack,
        }
    }
}

impl fmt::Display for ErrorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// `my_crate::io::ReadError<T>` -> `ReadError`
fn short_type_name(full: &str) -> String {
    let without_generics = full.split('<').next().unwrap_or(full);
    let short = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim_start_matches("dyn ")
        .trim();
    if short.is_empty() {
        "Error".to_string()
    } else {
        short.to_string()
    }
}

/// One argument of a console call.
#[derive(Debug, Clone)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Error(ErrorArg),
    Structured(Arc<dyn StructuredValue>),
    /// A value with a text form only, e.g. something that has no
    /// structural representation at all.
    Opaque(String),
}

impl Arg {
    /// Wrap any serializable value; serialization is deferred until the
    /// record is built.
    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Arg::Structured(Arc::new(value))
    }

    pub fn error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Arg::Error(ErrorArg::from_error(err))
    }

    /// Wrap a value that only has a `Display` form
    pub fn opaque(value: impl fmt::Display) -> Self {
        Arg::Opaque(value.to_string())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Str(s.clone())
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<i32> for Arg {
    fn from(i: i32) -> Self {
        Arg::Int(i as i64)
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<u32> for Arg {
    fn from(i: u32) -> Self {
        Arg::Int(i as i64)
    }
}

impl From<u64> for Arg {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(v) => Arg::Int(v),
            Err(_) => Arg::Float(i as f64),
        }
    }
}

impl From<usize> for Arg {
    fn from(i: usize) -> Self {
        Arg::from(i as u64)
    }
}

impl From<f32> for Arg {
    fn from(f: f32) -> Self {
        Arg::Float(f as f64)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<ErrorArg> for Arg {
    fn from(e: ErrorArg) -> Self {
        Arg::Error(e)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Null)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Arg::Int(i),
                None => Arg::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Arg::Str(s),
            other => Arg::Structured(Arc::new(other)),
        }
    }
}
