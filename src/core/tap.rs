//! The tap: console interception feeding the flush engine

use super::config::TapConfig;
use super::console::{Console, Interception};
use super::engine::{ErrorReporter, FlushEngine};
use super::error::{Result, TapError};
use super::log_level::LogLevel;
use super::metrics::TapMetrics;
use crate::sink::{ClientOptions, Credentials, SinkClient};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Captures console calls and ships them to a sink in batches.
///
/// # Example
///
/// ```
/// use rust_log_tap::prelude::*;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let console = Arc::new(Console::new());
/// let sink = Arc::new(MemorySink::new());
///
/// let config = TapConfig::new("my-project", "logs", "console_logs")
///     .with_enabled(true)
///     .with_passthrough(false);
/// let tap = LogTap::with_console(config, Arc::clone(&console), |_| Arc::clone(&sink))?;
///
/// tap.start()?;
/// console.info(&[Arg::from("user signed in"), Arg::structured(serde_json::json!({"id": 7}))]);
/// tap.stop().await;
///
/// assert_eq!(sink.rows()[0].message, "user signed in {\"id\":7}");
/// # Ok::<(), rust_log_tap::TapError>(())
/// # }).unwrap();
/// ```
pub struct LogTap {
    config: TapConfig,
    console: Arc<Console>,
    engine: Arc<FlushEngine>,
    reporter: ErrorReporter,
    metrics: Arc<TapMetrics>,
    state: Mutex<Phase>,
}

enum Phase {
    Idle,
    Active(Active),
    /// `stop()` is running its final flush
    Stopping,
}

/// Everything that exists only between `start()` and `stop()`.
///
/// Dropping it disarms the timer and restores the console.
struct Active {
    interception: Interception,
    timer: FlushTimer,
    runtime: Handle,
}

/// Aborts the timer task when dropped.
struct FlushTimer(JoinHandle<()>);

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl LogTap {
    /// Build a tap over the process-wide console.
    ///
    /// `connect` receives the parsed client options and returns the sink
    /// client. It is not called when the configuration is rejected.
    pub fn new<F, C>(config: TapConfig, connect: F) -> Result<Self>
    where
        F: FnOnce(ClientOptions) -> C,
        C: SinkClient + 'static,
    {
        Self::with_console(config, Console::global(), connect)
    }

    /// Build a tap over an explicit console.
    pub fn with_console<F, C>(config: TapConfig, console: Arc<Console>, connect: F) -> Result<Self>
    where
        F: FnOnce(ClientOptions) -> C,
        C: SinkClient + 'static,
    {
        let config = config.normalized();
        config.validate()?;

        let credentials = config
            .credentials
            .as_deref()
            .map(Credentials::parse)
            .transpose()?;

        let client: Arc<dyn SinkClient> = Arc::new(connect(ClientOptions {
            project_id: config.sink.project_id.clone(),
            dataset: config.sink.dataset.clone(),
            table: config.sink.table.clone(),
            credentials,
        }));

        // Diagnostics always go to the handlers as they are right now
        let reporter = ErrorReporter::new(
            config.on_error.clone(),
            console.handler(LogLevel::Log),
            console.handler(LogLevel::Error),
        );
        let metrics = Arc::new(TapMetrics::new());
        let engine = Arc::new(FlushEngine::new(
            &config,
            client,
            reporter.clone(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            console,
            engine,
            reporter,
            metrics,
            state: Mutex::new(Phase::Idle),
        })
    }

    /// Start intercepting the configured console levels and arm the flush
    /// timer.
    ///
    /// Does nothing when already active, while a `stop()` is still flushing,
    /// or when the tap is disabled.
    ///
    /// # Errors
    ///
    /// [`TapError::NoRuntime`] when called outside a Tokio runtime; nothing
    /// is intercepted in that case.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(*state, Phase::Idle) || !self.is_enabled() {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| TapError::NoRuntime)?;

        let interception = Interception::install(
            Arc::clone(&self.console),
            self.config.methods.iter().copied(),
            self.config.passthrough,
            &self.engine,
            &runtime,
        );
        let timer = FlushTimer(runtime.spawn(flush_timer(
            Arc::downgrade(&self.engine),
            self.config.flush_interval,
        )));

        *state = Phase::Active(Active {
            interception,
            timer,
            runtime,
        });
        Ok(())
    }

    /// Flush what is buffered, disarm the timer and restore the original
    /// console handlers. Safe to call repeatedly.
    pub async fn stop(&self) {
        let active = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, Phase::Stopping) {
                Phase::Active(active) => active,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        // Back to idle even if this future is dropped mid-flush
        let _idle = IdleOnDrop(&self.state);

        self.engine.flush().await;
        drop(active.timer);
        active.interception.restore();
    }

    /// Send everything buffered so far as one batch.
    pub async fn flush(&self) {
        self.engine.flush().await;
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.lock(), Phase::Active(_))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Levels currently wrapped by this tap
    pub fn intercepted_levels(&self) -> Vec<LogLevel> {
        match &*self.state.lock() {
            Phase::Active(active) => active.interception.levels().collect(),
            _ => Vec::new(),
        }
    }

    /// Records captured but not yet flushed
    pub fn pending(&self) -> usize {
        self.engine.pending()
    }

    pub fn is_table_ready(&self) -> bool {
        self.engine.is_table_ready()
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.console
    }

    /// Get the tap metrics
    ///
    /// # Example
    ///
    /// ```
    /// use rust_log_tap::{LogTap, MemorySink, TapConfig};
    ///
    /// let tap = LogTap::new(TapConfig::new("p", "d", "t"), |_| MemorySink::new()).unwrap();
    /// let metrics = tap.metrics();
    /// println!("Captured: {}", metrics.records_captured());
    /// println!("Drop rate: {:.2}%", metrics.drop_rate());
    /// ```
    pub fn metrics(&self) -> &TapMetrics {
        &self.metrics
    }
}

async fn flush_timer(engine: Weak<FlushEngine>, period: std::time::Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.flush().await;
    }
}

struct IdleOnDrop<'a>(&'a Mutex<Phase>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = Phase::Idle;
    }
}

impl Drop for LogTap {
    fn drop(&mut self) {
        if let Phase::Active(active) = std::mem::replace(self.state.get_mut(), Phase::Idle) {
            drop(active.timer);
            active.interception.restore();

            // Best effort: hand the remainder to the runtime
            if self.engine.pending() > 0 {
                let engine = Arc::clone(&self.engine);
                active.runtime.spawn(async move { engine.flush().await });
            }
        }

        let dropped = self.metrics.rows_dropped();
        if dropped > 0 {
            self.reporter.warn(format!(
                "LogTap: shutting down with {} dropped rows (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            ));
        }
    }
}

impl fmt::Debug for LogTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogTap")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .field("engine", &self.engine)
            .finish()
    }
}
