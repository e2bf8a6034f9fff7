//! Core tap types: arguments, records, console, engine

pub mod arg;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod log_entry;
pub mod log_level;
pub mod metrics;
pub mod serializer;
pub mod tap;

pub use arg::{Arg, ErrorArg, StructuredValue};
pub use config::{ErrorCallback, SinkIdentity, TapConfig};
pub use console::{Console, Handler, Interception};
pub use engine::{ErrorReporter, FlushEngine};
pub use error::{Result, TapError};
pub use log_entry::LogRecord;
pub use log_level::LogLevel;
pub use metrics::TapMetrics;
pub use serializer::EntrySerializer;
pub use tap::LogTap;
