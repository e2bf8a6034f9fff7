//! Log record structure written to the sink

use super::log_level::LogLevel;
use serde::{Deserialize, Serialize};

/// One captured console call, flattened into sink columns.
///
/// Built by the serializer at call time; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 instant of the console call, e.g. `2025-01-08T10:30:45.123Z`
    pub timestamp: String,
    pub level: LogLevel,
    /// Space-joined text form of the arguments
    pub message: String,
    /// JSON array of the normalized arguments
    pub args: String,
    /// JSON form of the configured metadata blob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl LogRecord {
    pub fn new(
        timestamp: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level,
            message: message.into(),
            args: args.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}
