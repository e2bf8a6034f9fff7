//! In-memory sink client
//!
//! Keeps rows in a `Vec` and records every call, which makes it the
//! natural sink for tests, demos and running without cloud access.
//! Failures can be injected for provisioning and inserts.

use super::{RowFailure, SinkClient, TableSchema};
use crate::core::{LogRecord, Result, TapError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// How inserts should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertFailure {
    /// Reject the whole batch with this message
    Total(String),
    /// Reject the rows at these batch positions, accept the rest
    RejectRows(Vec<usize>),
}

#[derive(Debug, Default)]
struct MemoryState {
    schema: Option<TableSchema>,
    rows: Vec<LogRecord>,
    exists_calls: usize,
    create_calls: usize,
    insert_calls: Vec<usize>,
    create_failure: Option<String>,
    insert_failure: Option<InsertFailure>,
}

/// Sink client backed by process memory.
///
/// # Example
///
/// ```
/// use rust_log_tap::sink::{MemorySink, SinkClient, TableSchema};
///
/// # tokio_test::block_on(async {
/// let sink = MemorySink::new();
/// assert!(!sink.table_exists().await.unwrap());
///
/// sink.create_table(&TableSchema::log_table()).await.unwrap();
/// assert!(sink.table_exists().await.unwrap());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemorySink {
    /// A sink with no table yet.
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            ..Default::default()
        }
    }

    /// A sink whose log table already exists.
    pub fn with_existing_table() -> Self {
        let sink = Self::new();
        sink.state.lock().schema = Some(TableSchema::log_table());
        sink
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Delay every insert, to keep a flush in flight across an await.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `create_table` fail with `message`.
    #[must_use]
    pub fn fail_create_table(self, message: impl Into<String>) -> Self {
        self.state.lock().create_failure = Some(message.into());
        self
    }

    /// Make every insert fail as described until [`clear_failure`](Self::clear_failure).
    #[must_use]
    pub fn fail_inserts(self, failure: InsertFailure) -> Self {
        self.set_insert_failure(failure);
        self
    }

    pub fn set_insert_failure(&self, failure: InsertFailure) {
        self.state.lock().insert_failure = Some(failure);
    }

    pub fn clear_failure(&self) {
        let mut state = self.state.lock();
        state.insert_failure = None;
        state.create_failure = None;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows accepted so far, in insertion order.
    pub fn rows(&self) -> Vec<LogRecord> {
        self.state.lock().rows.clone()
    }

    pub fn schema(&self) -> Option<TableSchema> {
        self.state.lock().schema.clone()
    }

    pub fn exists_calls(&self) -> usize {
        self.state.lock().exists_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    /// Batch length of every insert call, in call order.
    pub fn insert_calls(&self) -> Vec<usize> {
        self.state.lock().insert_calls.clone()
    }
}

fn validate_row(schema: &TableSchema, row: &LogRecord) -> Vec<String> {
    schema
        .required_fields()
        .filter(|field| match field.name.as_str() {
            "timestamp" => row.timestamp.is_empty(),
            _ => false,
        })
        .map(|field| format!("Missing required field: {}", field.name))
        .collect()
}

#[async_trait]
impl SinkClient for MemorySink {
    async fn table_exists(&self) -> Result<bool> {
        let mut state = self.state.lock();
        state.exists_calls += 1;
        Ok(state.schema.is_some())
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut state = self.state.lock();
        state.create_calls += 1;

        if let Some(message) = &state.create_failure {
            return Err(TapError::provisioning(&self.name, message.clone()));
        }
        if state.schema.is_some() {
            return Err(TapError::already_exists(&self.name));
        }
        state.schema = Some(schema.clone());
        Ok(())
    }

    async fn insert_rows(&self, rows: &[LogRecord]) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.insert_calls.push(rows.len());

        let schema = match &state.schema {
            Some(schema) => schema.clone(),
            None => {
                return Err(TapError::sink(
                    "inserting rows",
                    format!("Not found: Table {}", self.name),
                ))
            }
        };

        let rejected: Vec<usize> = match &state.insert_failure {
            Some(InsertFailure::Total(message)) => {
                return Err(TapError::sink("inserting rows", message.clone()))
            }
            Some(InsertFailure::RejectRows(indices)) => indices.clone(),
            None => Vec::new(),
        };

        let mut failures = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let mut reasons = validate_row(&schema, row);
            if rejected.contains(&index) && reasons.is_empty() {
                reasons.push("invalid".to_string());
            }
            if reasons.is_empty() {
                state.rows.push(row.clone());
            } else {
                failures.push(RowFailure::new(index, reasons).with_row(row.clone()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TapError::partial_insert(rows.len(), failures))
        }
    }
}
