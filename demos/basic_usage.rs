//! Basic tap usage example
//!
//! Intercepts the process-wide console, logs at every level and ships the
//! records to an in-memory sink.
//!
//! Run with: cargo run --example basic_usage

use rust_log_tap::prelude::*;
use rust_log_tap::{debug, error, info, log, warn};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    println!("=== Rust Log Tap - Basic Usage Example ===\n");

    let sink = Arc::new(MemorySink::new());
    let config = TapConfig::new("example-project", "example_dataset", "console_logs")
        .with_enabled(true)
        .with_batch_size(10)
        .with_flush_interval(Duration::from_secs(5))
        .with_metadata(serde_json::json!({"service": "example-app", "version": "1.0.0"}))
        .with_error_handler(|err| eprintln!("LogTap error: {}", err));

    let tap = LogTap::new(config, |_| Arc::clone(&sink))?;
    let console = Console::global();

    tap.start()?;

    println!("1. Logging at every level (passthrough keeps local output):");
    log!(console, "This is a log message");
    info!(console, "This is an info message", serde_json::json!({"userId": 123}));
    warn!(console, "This is a warning", serde_json::json!({"code": "WARN_001"}));
    let err = std::io::Error::new(std::io::ErrorKind::Other, "Something went wrong");
    error!(console, "This is an error", Arg::error(&err));
    debug!(console, "Debug information", serde_json::json!({"debugData": true}));

    println!("\n2. Flushing manually:");
    tap.flush().await;
    println!("   {} rows in the sink", sink.rows().len());

    tap.stop().await;

    println!("\n3. Stored rows:");
    for row in sink.rows() {
        println!("   [{}] {:5} {}", row.timestamp, row.level, row.message);
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
