//! Sink client boundary
//!
//! The tap talks to its table through [`SinkClient`]. Real clients
//! (BigQuery or anything with the same shape) implement the trait;
//! [`MemorySink`] is the in-process implementation used for tests and
//! local development.

pub mod credentials;
pub mod memory;
pub mod schema;

pub use credentials::{ClientOptions, Credentials};
pub use memory::{InsertFailure, MemorySink};
pub use schema::{FieldMode, FieldSchema, FieldType, TableSchema};

use crate::core::{LogRecord, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operations the tap needs from its sink.
///
/// # Example
///
/// ```no_run
/// use rust_log_tap::sink::{SinkClient, TableSchema};
/// use rust_log_tap::{LogRecord, Result};
/// use async_trait::async_trait;
///
/// struct MyClient;
///
/// #[async_trait]
/// impl SinkClient for MyClient {
///     async fn table_exists(&self) -> Result<bool> {
///         Ok(true)
///     }
///
///     async fn create_table(&self, _schema: &TableSchema) -> Result<()> {
///         Ok(())
///     }
///
///     async fn insert_rows(&self, _rows: &[LogRecord]) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SinkClient: Send + Sync {
    async fn table_exists(&self) -> Result<bool>;

    /// Create the table. A table that already exists should surface as
    /// [`TapError::TableAlreadyExists`](crate::TapError::TableAlreadyExists).
    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Insert one batch. Rejecting only some rows is reported as
    /// [`TapError::PartialInsert`](crate::TapError::PartialInsert).
    async fn insert_rows(&self, rows: &[LogRecord]) -> Result<()>;
}

#[async_trait]
impl<T: SinkClient + ?Sized> SinkClient for Arc<T> {
    async fn table_exists(&self) -> Result<bool> {
        (**self).table_exists().await
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        (**self).create_table(schema).await
    }

    async fn insert_rows(&self, rows: &[LogRecord]) -> Result<()> {
        (**self).insert_rows(rows).await
    }
}

/// A single rejected row of a partially failed insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Position of the row within the submitted batch
    pub index: usize,
    pub reasons: Vec<String>,
    /// The rejected row, when the sink echoes it back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<LogRecord>,
}

impl RowFailure {
    pub fn new(index: usize, reasons: Vec<String>) -> Self {
        Self {
            index,
            reasons,
            row: None,
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: LogRecord) -> Self {
        self.row = Some(row);
        self
    }
}
