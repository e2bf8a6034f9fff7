//! Tap configuration
//!
//! A [`TapConfig`] is built once, normalized at construction of the tap and
//! never changed afterwards.

use super::error::{Result, TapError};
use super::log_level::LogLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide switch; `false` or `0` disables every tap that does not set
/// `enabled` explicitly.
pub const ENABLED_ENV: &str = "LOGTAP_ENABLED";
/// Older name for [`ENABLED_ENV`], read when the new one is unset.
pub const LEGACY_ENABLED_ENV: &str = "BQTAP_ENABLED";
pub const PROJECT_ID_ENV: &str = "LOGTAP_PROJECT_ID";
pub const DATASET_ENV: &str = "LOGTAP_DATASET";
pub const TABLE_ENV: &str = "LOGTAP_TABLE";
pub const CREDENTIALS_ENV: &str = "LOGTAP_CREDENTIALS";

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_TABLE: &str = "console_logs";

/// Callback receiving runtime failures (provisioning and insert errors)
pub type ErrorCallback = Arc<dyn Fn(&TapError) + Send + Sync>;

/// Which table the tap writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkIdentity {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

impl SinkIdentity {
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// `dataset.table`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("project_id", &self.project_id),
            ("dataset", &self.dataset),
            ("table", &self.table),
        ] {
            if value.trim().is_empty() {
                return Err(TapError::config(
                    "SinkIdentity",
                    format!("{} must not be empty", name),
                ));
            }
        }
        Ok(())
    }
}

/// Tap configuration.
///
/// # Example
///
/// ```
/// use rust_log_tap::{LogLevel, TapConfig};
/// use std::time::Duration;
///
/// let config = TapConfig::new("my-project", "logs", "console_logs")
///     .with_methods([LogLevel::Log, LogLevel::Error])
///     .with_batch_size(50)
///     .with_flush_interval(Duration::from_secs(2))
///     .with_metadata(serde_json::json!({"service": "api"}));
///
/// assert_eq!(config.batch_size, 50);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapConfig {
    #[serde(flatten)]
    pub sink: SinkIdentity,

    /// Service-account credentials as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    /// `None` defers to [`ENABLED_ENV`]
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default = "default_true")]
    pub auto_create_table: bool,

    #[serde(default = "default_methods")]
    pub methods: Vec<LogLevel>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval", with = "duration_millis")]
    pub flush_interval: Duration,

    #[serde(default = "default_true")]
    pub passthrough: bool,

    /// Static blob attached to every record
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,

    #[serde(skip)]
    pub on_error: Option<ErrorCallback>,
}

fn default_true() -> bool {
    true
}

fn default_methods() -> Vec<LogLevel> {
    LogLevel::ALL.to_vec()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

impl TapConfig {
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            sink: SinkIdentity::new(project_id, dataset, table),
            credentials: None,
            enabled: None,
            auto_create_table: true,
            methods: default_methods(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            passthrough: true,
            metadata: None,
            on_error: None,
        }
    }

    /// Build from `LOGTAP_*` environment variables.
    ///
    /// Project id and dataset are required; the table defaults to
    /// [`DEFAULT_TABLE`].
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key)
                .map_err(|_| TapError::config("TapConfig", format!("{} is not set", key)))
        };

        let project_id = required(PROJECT_ID_ENV)?;
        let dataset = required(DATASET_ENV)?;
        let table = std::env::var(TABLE_ENV).unwrap_or_else(|_| DEFAULT_TABLE.to_string());

        let mut config = Self::new(project_id, dataset, table);
        config.credentials = std::env::var(CREDENTIALS_ENV).ok();
        Ok(config)
    }

    /// Parse a JSON configuration document (camelCase keys, `flushInterval`
    /// in milliseconds).
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_auto_create_table(mut self, auto_create: bool) -> Self {
        self.auto_create_table = auto_create;
        self
    }

    #[must_use]
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = LogLevel>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TapError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Explicit `enabled`, else the process-wide flag.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or_else(enabled_from_env)
    }

    /// Apply defaults: zero batch size or interval falls back to the
    /// defaults, duplicate methods are removed, `enabled` is resolved.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        let mut seen = Vec::with_capacity(self.methods.len());
        self.methods.retain(|level| {
            if seen.contains(level) {
                false
            } else {
                seen.push(*level);
                true
            }
        });
        self.enabled = Some(self.is_enabled());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.sink.validate()
    }
}

impl fmt::Debug for TapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapConfig")
            .field("sink", &self.sink)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("enabled", &self.enabled)
            .field("auto_create_table", &self.auto_create_table)
            .field("methods", &self.methods)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("passthrough", &self.passthrough)
            .field("metadata", &self.metadata)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Reads [`ENABLED_ENV`], falling back to [`LEGACY_ENABLED_ENV`]; anything
/// but `false`/`0` (including unset) enables.
pub fn enabled_from_env() -> bool {
    [ENABLED_ENV, LEGACY_ENABLED_ENV]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .map_or(true, |value| !matches!(value.trim(), "false" | "0"))
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TapConfig::new("p", "d", "t");
        assert!(config.auto_create_table);
        assert!(config.passthrough);
        assert_eq!(config.methods, LogLevel::ALL.to_vec());
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_millis(5000));
        assert!(config.metadata.is_none());
        assert!(config.on_error.is_none());
    }

    #[test]
    fn test_normalized_replaces_zero_values() {
        let config = TapConfig::new("p", "d", "t")
            .with_batch_size(0)
            .with_flush_interval(Duration::ZERO)
            .with_methods([LogLevel::Log, LogLevel::Error, LogLevel::Log])
            .with_enabled(false)
            .normalized();

        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.methods, vec![LogLevel::Log, LogLevel::Error]);
        assert_eq!(config.enabled, Some(false));
    }

    #[test]
    fn test_explicit_enabled_wins() {
        assert!(TapConfig::new("p", "d", "t").with_enabled(true).is_enabled());
        assert!(!TapConfig::new("p", "d", "t").with_enabled(false).is_enabled());
    }

    #[test]
    fn test_validate_rejects_empty_identity() {
        let err = TapConfig::new("p", " ", "t").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for SinkIdentity: dataset must not be empty"
        );
        assert!(TapConfig::new("p", "d", "t").validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = TapConfig::from_json(
            r#"{
                "projectId": "my-project",
                "dataset": "logs",
                "table": "console_logs",
                "methods": ["log", "error"],
                "batchSize": 25,
                "flushInterval": 1500,
                "passthrough": false,
                "metadata": {"service": "api"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.sink, SinkIdentity::new("my-project", "logs", "console_logs"));
        assert_eq!(config.methods, vec![LogLevel::Log, LogLevel::Error]);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_millis(1500));
        assert!(!config.passthrough);
        assert!(config.auto_create_table);
        assert_eq!(config.metadata, Some(serde_json::json!({"service": "api"})));
    }

    /// Environment variables are process-wide; tests touching them take this
    /// lock and start from a clean slate.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    const ALL_ENV: [&str; 6] = [
        ENABLED_ENV,
        LEGACY_ENABLED_ENV,
        PROJECT_ID_ENV,
        DATASET_ENV,
        TABLE_ENV,
        CREDENTIALS_ENV,
    ];

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock();
        for key in ALL_ENV {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let result = f();
        for key in ALL_ENV {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn test_from_env_defaults_table() {
        let config = with_env(
            &[(PROJECT_ID_ENV, "env-project"), (DATASET_ENV, "env_logs")],
            TapConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.sink, SinkIdentity::new("env-project", "env_logs", DEFAULT_TABLE));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_from_env_reads_table_and_credentials() {
        let config = with_env(
            &[
                (PROJECT_ID_ENV, "p"),
                (DATASET_ENV, "d"),
                (TABLE_ENV, "custom"),
                (CREDENTIALS_ENV, "{\"client_email\":\"a@b.c\"}"),
            ],
            TapConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.sink.table, "custom");
        assert_eq!(config.credentials.as_deref(), Some("{\"client_email\":\"a@b.c\"}"));
    }

    #[test]
    fn test_from_env_missing_required_variable() {
        let err = with_env(&[(PROJECT_ID_ENV, "p")], TapConfig::from_env).unwrap_err();

        assert!(matches!(err, TapError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains(DATASET_ENV));
    }

    #[test]
    fn test_enabled_flag_values() {
        assert!(with_env(&[], enabled_from_env));
        assert!(!with_env(&[(ENABLED_ENV, "0")], enabled_from_env));
        assert!(!with_env(&[(ENABLED_ENV, " false ")], enabled_from_env));
        assert!(with_env(&[(ENABLED_ENV, "true")], enabled_from_env));
        assert!(with_env(&[(ENABLED_ENV, "no")], enabled_from_env));
    }

    #[test]
    fn test_legacy_enabled_flag() {
        assert!(!with_env(&[(LEGACY_ENABLED_ENV, "false")], enabled_from_env));
        assert!(with_env(
            &[(ENABLED_ENV, "1"), (LEGACY_ENABLED_ENV, "false")],
            enabled_from_env
        ));
    }

    #[test]
    fn test_config_without_explicit_flag_follows_env() {
        let disabled = with_env(&[(ENABLED_ENV, "0")], || {
            TapConfig::new("p", "d", "t").normalized()
        });
        assert_eq!(disabled.enabled, Some(false));
        assert!(!disabled.is_enabled());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = TapConfig::new("p", "d", "t").with_credentials("{\"private_key\":\"secret\"}");
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret"));
    }
}
