//! Error types for the log tap

use crate::sink::RowFailure;

pub type Result<T> = std::result::Result<T, TapError>;

#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// Credentials text could not be parsed
    #[error("Invalid credentials JSON string: {message}")]
    InvalidCredentials {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// The tap was started outside of a Tokio runtime
    #[error("No async runtime available to drive the flush timer")]
    NoRuntime,

    /// The sink reported the table as already present during creation
    #[error("Table '{table}' already exists")]
    TableAlreadyExists { table: String },

    /// Table provisioning failed for any other reason
    #[error("Failed to provision table '{table}': {message}")]
    TableProvisioning { table: String, message: String },

    /// Generic sink failure
    #[error("Sink error while {operation}: {message}")]
    Sink { operation: String, message: String },

    /// The sink accepted part of a batch and rejected the listed rows
    #[error("Partial failure: {} of {total} rows rejected", .failures.len())]
    PartialInsert {
        total: usize,
        failures: Vec<RowFailure>,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TapError {
    /// Create an invalid credentials error
    pub fn invalid_credentials(
        message: impl Into<String>,
        source: Option<serde_json::Error>,
    ) -> Self {
        TapError::InvalidCredentials {
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        TapError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn already_exists(table: impl Into<String>) -> Self {
        TapError::TableAlreadyExists {
            table: table.into(),
        }
    }

    pub fn provisioning(table: impl Into<String>, message: impl Into<String>) -> Self {
        TapError::TableProvisioning {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a sink error for the named operation
    pub fn sink(operation: impl Into<String>, message: impl Into<String>) -> Self {
        TapError::Sink {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn partial_insert(total: usize, failures: Vec<RowFailure>) -> Self {
        TapError::PartialInsert { total, failures }
    }

    /// True when the sink says the table is already there (HTTP 409 equivalent)
    pub fn is_already_exists(&self) -> bool {
        match self {
            TapError::TableAlreadyExists { .. } => true,
            TapError::Sink { message, .. } | TapError::TableProvisioning { message, .. } => {
                message.contains("Already Exists")
            }
            _ => false,
        }
    }

    /// Per-row rejections, empty unless this is a partial insert failure
    pub fn row_failures(&self) -> &[RowFailure] {
        match self {
            TapError::PartialInsert { failures, .. } => failures,
            _ => &[],
        }
    }
}
