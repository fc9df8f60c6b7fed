//! dgw Telemetry - logging and metrics for the gateway client
//!
//! - **Structured Logging**: JSON or pretty output behind an `EnvFilter`
//! - **Redaction**: [`redact_sensitive`] scrubs tokens from payloads before they are logged
//! - **Metrics**: helpers over the `metrics` facade; install any recorder to collect them
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dgw_telemetry::{TelemetryConfig, init_telemetry};
//!
//! init_telemetry(&TelemetryConfig::new("my-bot").with_json_logs(false))?;
//! tracing::info!("Starting up");
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;
pub mod metrics;

pub use logging::*;

use std::sync::OnceLock;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Field-name fragments redacted by default.
pub const DEFAULT_REDACT_FIELDS: &[&str] = &["token", "password", "secret", "authorization"];

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line.
    pub service_name: String,

    /// Log level filter (e.g., "info", "debug", "`dgw_discord=trace`").
    pub log_level: String,

    /// Enable JSON log output.
    pub json_logs: bool,

    /// Fields to redact from logged payloads.
    pub redact_fields: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dgw".to_string(),
            log_level: "info".to_string(),
            json_logs: true,
            redact_fields: DEFAULT_REDACT_FIELDS.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON logs.
    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Add fields to redact from logs.
    #[must_use]
    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields.extend(fields);
        self
    }
}

/// Initialize logging and describe the client metrics.
///
/// Subsequent calls are no-ops.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed by someone else.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    init_logging(config)?;
    metrics::describe_metrics();
    let _ = INITIALIZED.set(());

    tracing::info!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}

/// Telemetry error type.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();

        assert_eq!(config.service_name, "dgw");
        assert_eq!(config.log_level, "info");
        assert!(config.json_logs);
        assert!(config.redact_fields.iter().any(|f| f == "token"));
    }

    #[test]
    fn test_telemetry_config_builders() {
        let config = TelemetryConfig::new("bot")
            .with_log_level("debug")
            .with_json_logs(false)
            .with_redact_fields(vec!["session_id".to_string()]);

        assert_eq!(config.service_name, "bot");
        assert_eq!(config.log_level, "debug");
        assert!(!config.json_logs);
        assert!(config.redact_fields.iter().any(|f| f == "session_id"));
        assert!(config.redact_fields.iter().any(|f| f == "token"));
    }
}
