//! # Rust Log Tap
//!
//! Intercepts console-style logging calls, batches the captured entries in
//! memory and ships them to a remote tabular sink, while still printing them
//! locally.
//!
//! ## Features
//!
//! - **Passthrough**: the original console output is left intact
//! - **Batching**: flush on a size threshold or a timer, whichever comes first
//! - **Best effort**: sink failures are reported, never raised into the host
//! - **Reversible**: stopping restores the exact original handlers

pub mod core;
pub mod macros;
pub mod sink;

pub mod prelude {
    pub use crate::core::{
        Arg, Console, ErrorArg, LogLevel, LogRecord, LogTap, Result, SinkIdentity, TapConfig,
        TapError, TapMetrics,
    };
    pub use crate::sink::{MemorySink, SinkClient, TableSchema};
}

pub use crate::core::{
    Arg, Console, EntrySerializer, ErrorArg, ErrorCallback, Handler, LogLevel, LogRecord, LogTap,
    Result, SinkIdentity, StructuredValue, TapConfig, TapError, TapMetrics,
};
pub use sink::{ClientOptions, Credentials, MemorySink, RowFailure, SinkClient, TableSchema};
