//! Buffering/flush engine
//!
//! Holds captured records in memory and drains them into the sink.
//!
//! Delivery is at-most-once: a batch is removed from the buffer before the
//! insert is attempted and is never re-enqueued, whatever the outcome.
//! Flushes may overlap (batch threshold and timer firing together); the
//! only synchronisation point is the swap of the whole buffer for an empty
//! one, which happens before any await.

use super::arg::Arg;
use super::config::{ErrorCallback, SinkIdentity, TapConfig};
use super::console::Handler;
use super::error::TapError;
use super::log_entry::LogRecord;
use super::metrics::TapMetrics;
use super::serializer::EntrySerializer;
use crate::sink::{RowFailure, SinkClient, TableSchema};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct FlushEngine {
    client: Arc<dyn SinkClient>,
    identity: SinkIdentity,
    serializer: EntrySerializer,
    buffer: Mutex<Vec<LogRecord>>,
    batch_size: usize,
    auto_create_table: bool,
    /// Resolves once, whether provisioning succeeded or not
    table_ready: OnceCell<()>,
    reporter: ErrorReporter,
    metrics: Arc<TapMetrics>,
}

impl FlushEngine {
    pub fn new(
        config: &TapConfig,
        client: Arc<dyn SinkClient>,
        reporter: ErrorReporter,
        metrics: Arc<TapMetrics>,
    ) -> Self {
        Self {
            client,
            identity: config.sink.clone(),
            serializer: EntrySerializer::new(config.metadata.as_ref()),
            buffer: Mutex::new(Vec::with_capacity(config.batch_size)),
            batch_size: config.batch_size,
            auto_create_table: config.auto_create_table,
            table_ready: OnceCell::new(),
            reporter,
            metrics,
        }
    }

    pub fn serializer(&self) -> &EntrySerializer {
        &self.serializer
    }

    pub fn metrics(&self) -> &TapMetrics {
        &self.metrics
    }

    /// Number of records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether table provisioning has been resolved (successfully or not)
    pub fn is_table_ready(&self) -> bool {
        self.table_ready.initialized()
    }

    /// Push a record to the buffer tail.
    ///
    /// Returns `true` when the buffer has reached the batch threshold and the
    /// caller should schedule a flush.
    pub fn append(&self, record: LogRecord) -> bool {
        self.metrics.record_captured();
        let mut buffer = self.buffer.lock();
        buffer.push(record);
        buffer.len() >= self.batch_size
    }

    /// Drain the whole buffer into the sink as one batch.
    ///
    /// Never fails: sink errors are routed to the error callback or the
    /// original error handler.
    pub async fn flush(&self) {
        if self.buffer.lock().is_empty() {
            return;
        }

        if self.auto_create_table {
            self.table_ready.get_or_init(|| self.ensure_table()).await;
        }

        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            // A concurrent flush took it while the table was being resolved
            return;
        }

        let total = batch.len();
        match self.client.insert_rows(&batch).await {
            Ok(()) => self.metrics.record_batch(total),
            Err(err) => {
                let rejected = match &err {
                    TapError::PartialInsert { failures, .. } => {
                        self.reporter.report_row_failures(failures);
                        failures.len().min(total)
                    }
                    _ => total,
                };
                self.metrics.record_failed_batch(total, rejected);
                self.reporter.report("Failed to insert logs:", &err);
            }
        }
    }

    async fn ensure_table(&self) {
        let table = self.identity.qualified_table();

        let created = match self.client.table_exists().await {
            Ok(true) => Ok(false),
            Ok(false) => self
                .client
                .create_table(&TableSchema::log_table())
                .await
                .map(|()| true),
            Err(err) => Err(err),
        };

        match created {
            Ok(true) => {
                self.metrics.record_table_created();
                self.reporter.notice(format!("LogTap: Created table {}", table));
            }
            Ok(false) => {}
            Err(err) if err.is_already_exists() => {}
            Err(err) => self.reporter.report("Failed to ensure table exists:", &err),
        }
    }
}

impl fmt::Debug for FlushEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushEngine")
            .field("sink", &self.identity)
            .field("pending", &self.pending())
            .field("batch_size", &self.batch_size)
            .field("auto_create_table", &self.auto_create_table)
            .field("table_ready", &self.is_table_ready())
            .finish()
    }
}

/// Where runtime failures go.
///
/// Holds the console handlers as they were before interception, so the
/// tap's own diagnostics can never loop back into the buffer.
#[derive(Clone)]
pub struct ErrorReporter {
    on_error: Option<ErrorCallback>,
    log: Handler,
    error: Handler,
}

impl ErrorReporter {
    pub fn new(on_error: Option<ErrorCallback>, log: Handler, error: Handler) -> Self {
        Self {
            on_error,
            log,
            error,
        }
    }

    /// Hand `err` to the callback, or print it on the original error handler.
    pub fn report(&self, context: &str, err: &TapError) {
        match &self.on_error {
            Some(callback) => callback(err),
            None => (self.error)(&[
                Arg::from(format!("LogTap: {}", context)),
                Arg::from(err.to_string()),
            ]),
        }
    }

    /// Per-row rejection detail; always printed, callback or not.
    pub fn report_row_failures(&self, failures: &[RowFailure]) {
        (self.error)(&[Arg::from("LogTap: Partial failure inserting logs:")]);
        for failure in failures {
            (self.error)(&[
                Arg::from(format!("  Row {}:", failure.index)),
                Arg::structured(failure.reasons.clone()),
            ]);
            let row = failure
                .row
                .as_ref()
                .and_then(|row| serde_json::to_string_pretty(row).ok())
                .unwrap_or_else(|| "null".to_string());
            (self.error)(&[Arg::from("  Data:"), Arg::from(row)]);
        }
    }

    pub fn notice(&self, message: impl Into<String>) {
        (self.log)(&[Arg::from(message.into())]);
    }

    pub fn warn(&self, message: impl Into<String>) {
        (self.error)(&[Arg::from(message.into())]);
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("has_callback", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log_level::LogLevel;
    use crate::sink::{InsertFailure, MemorySink};

    struct Harness {
        engine: Arc<FlushEngine>,
        sink: Arc<MemorySink>,
        errors: Arc<Mutex<Vec<String>>>,
        printed: Arc<Mutex<Vec<String>>>,
    }

    fn harness(config: TapConfig, sink: MemorySink, with_callback: bool) -> Harness {
        let sink = Arc::new(sink);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let printed = Arc::new(Mutex::new(Vec::new()));

        let callback: Option<ErrorCallback> = if with_callback {
            let errors = Arc::clone(&errors);
            Some(Arc::new(move |err: &TapError| errors.lock().push(err.to_string())))
        } else {
            None
        };
        let print = |sink: Arc<Mutex<Vec<String>>>| -> Handler {
            Arc::new(move |args: &[Arg]| {
                sink.lock().push(crate::core::serializer::format_message(args))
            })
        };
        let reporter = ErrorReporter::new(callback, print(Arc::clone(&printed)), print(Arc::clone(&printed)));

        let engine = Arc::new(FlushEngine::new(
            &config.normalized(),
            Arc::clone(&sink) as Arc<dyn SinkClient>,
            reporter,
            Arc::new(TapMetrics::new()),
        ));
        Harness {
            engine,
            sink,
            errors,
            printed,
        }
    }

    fn config() -> TapConfig {
        TapConfig::new("proj", "logs", "console").with_batch_size(3)
    }

    fn record(message: &str) -> LogRecord {
        LogRecord::new("2025-01-08T10:30:45.123Z", LogLevel::Log, message, "[]")
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_never_contacts_sink() {
        let h = harness(config(), MemorySink::new(), false);
        h.engine.flush().await;

        assert_eq!(h.sink.exists_calls(), 0);
        assert_eq!(h.sink.create_calls(), 0);
        assert!(h.sink.insert_calls().is_empty());
        assert!(!h.engine.is_table_ready());
    }

    #[tokio::test]
    async fn test_append_reports_threshold() {
        let h = harness(config(), MemorySink::new(), false);
        assert!(!h.engine.append(record("a")));
        assert!(!h.engine.append(record("b")));
        assert!(h.engine.append(record("c")));
        assert_eq!(h.engine.pending(), 3);
    }

    #[tokio::test]
    async fn test_flush_creates_table_then_inserts_in_order() {
        let h = harness(config(), MemorySink::new(), false);
        h.engine.append(record("first"));
        h.engine.append(record("second"));
        h.engine.flush().await;

        assert_eq!(h.sink.create_calls(), 1);
        assert_eq!(h.sink.insert_calls(), vec![2]);
        let messages: Vec<String> = h.sink.rows().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(h.engine.pending(), 0);
        assert!(h.engine.is_table_ready());
        assert_eq!(*h.printed.lock(), vec!["LogTap: Created table logs.console".to_string()]);
    }

    #[tokio::test]
    async fn test_table_provisioning_runs_once_even_on_failure() {
        let sink = MemorySink::new().fail_create_table("permission denied");
        let h = harness(config(), sink, true);

        h.engine.append(record("a"));
        h.engine.flush().await;
        h.engine.append(record("b"));
        h.engine.flush().await;

        assert_eq!(h.sink.exists_calls(), 1);
        assert_eq!(h.sink.create_calls(), 1);
        assert!(h.engine.is_table_ready());
        // Provisioning error, then two inserts into a missing table
        assert_eq!(h.errors.lock().len(), 3);
        assert!(h.errors.lock()[0].contains("permission denied"));
    }

    #[tokio::test]
    async fn test_already_exists_is_not_reported() {
        let sink = MemorySink::new().fail_create_table("Already Exists: Table proj:logs.console");
        let h = harness(config(), sink, true);

        h.engine.append(record("a"));
        h.engine.flush().await;

        assert!(h.engine.is_table_ready());
        assert!(!h.errors.lock().iter().any(|e| e.contains("Already Exists")));
    }

    #[tokio::test]
    async fn test_auto_create_disabled_skips_provisioning() {
        let h = harness(
            config().with_auto_create_table(false),
            MemorySink::with_existing_table(),
            false,
        );
        h.engine.append(record("a"));
        h.engine.flush().await;

        assert_eq!(h.sink.exists_calls(), 0);
        assert_eq!(h.sink.insert_calls(), vec![1]);
    }

    #[tokio::test]
    async fn test_total_failure_drops_batch_and_uses_fallback_output() {
        let sink = MemorySink::with_existing_table().fail_inserts(InsertFailure::Total(
            "backend unavailable".to_string(),
        ));
        let h = harness(config(), sink, false);

        h.engine.append(record("a"));
        h.engine.append(record("b"));
        h.engine.flush().await;

        assert_eq!(h.engine.pending(), 0);
        assert!(h.sink.rows().is_empty());
        assert_eq!(h.engine.metrics().rows_dropped(), 2);
        assert_eq!(h.engine.metrics().flush_failures(), 1);
        let printed = h.printed.lock();
        assert_eq!(printed.len(), 1);
        assert!(printed[0].starts_with("LogTap: Failed to insert logs:"));
        assert!(printed[0].contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_partial_failure_reports_rows_and_invokes_callback() {
        let sink = MemorySink::with_existing_table()
            .fail_inserts(InsertFailure::RejectRows(vec![0]));
        let h = harness(config(), sink, true);

        h.engine.append(record("bad"));
        h.engine.append(record("good"));
        h.engine.flush().await;

        let messages: Vec<String> = h.sink.rows().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["good"]);
        assert_eq!(*h.errors.lock(), vec!["Partial failure: 1 of 2 rows rejected".to_string()]);

        let printed = h.printed.lock();
        assert_eq!(printed[0], "LogTap: Partial failure inserting logs:");
        assert!(printed[1].starts_with("  Row 0:"));
        assert!(printed[2].contains("\"message\": \"bad\""));

        assert_eq!(h.engine.metrics().rows_inserted(), 1);
        assert_eq!(h.engine.metrics().rows_dropped(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_not_retried() {
        let sink = MemorySink::with_existing_table()
            .fail_inserts(InsertFailure::Total("quota".to_string()));
        let h = harness(config(), sink, true);

        h.engine.append(record("a"));
        h.engine.flush().await;
        h.sink.clear_failure();
        h.engine.flush().await;

        assert_eq!(h.sink.insert_calls(), vec![1]);
        assert!(h.sink.rows().is_empty());
    }
}
