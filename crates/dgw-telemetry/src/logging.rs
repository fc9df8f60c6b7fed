//! Structured logging with JSON output and sensitive data redaction.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::{TelemetryConfig, TelemetryError};

/// Initialize the logging subsystem.
pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let pretty_layer = fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(pretty_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Redact sensitive fields from a JSON value.
///
/// A key is redacted when it contains any of `fields`, case-insensitively.
#[must_use]
pub fn redact_sensitive(value: &serde_json::Value, fields: &[String]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (key, val) in map {
                let lowered = key.to_lowercase();
                if fields.iter().any(|f| lowered.contains(&f.to_lowercase())) {
                    result.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    result.insert(key.clone(), redact_sensitive(val, fields));
                }
            }
            serde_json::Value::Object(result)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(|v| redact_sensitive(v, fields)).collect())
        }
        other => other.clone(),
    }
}

/// Mask a secret for display, keeping only its last four characters.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{tail}", "*".repeat(count - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_identify_payload() {
        let value = json!({
            "op": 2,
            "d": {
                "token": "Bot abc.def.ghi",
                "intents": 513,
                "properties": {"os": "linux", "browser": "dgw", "device": "dgw"}
            }
        });

        let redacted = redact_sensitive(&value, &["token".to_string()]);

        assert_eq!(redacted["op"], 2);
        assert_eq!(redacted["d"]["token"], "[REDACTED]");
        assert_eq!(redacted["d"]["intents"], 513);
        assert_eq!(redacted["d"]["properties"]["os"], "linux");
    }

    #[test]
    fn test_redact_nested_array() {
        let value = json!({
            "sessions": [
                {"id": "a", "session_token": "t1"},
                {"id": "b", "Session_Token": "t2"}
            ]
        });

        let redacted = redact_sensitive(&value, &["token".to_string()]);

        assert_eq!(redacted["sessions"][0]["id"], "a");
        assert_eq!(redacted["sessions"][0]["session_token"], "[REDACTED]");
        assert_eq!(redacted["sessions"][1]["Session_Token"], "[REDACTED]");
    }

    #[test]
    fn test_redact_preserves_primitives() {
        let value = json!(["one", 2, null, true]);
        let redacted = redact_sensitive(&value, &["password".to_string()]);
        assert_eq!(redacted, value);
    }

    #[test]
    fn test_redact_no_fields() {
        let value = json!({"token": "visible"});
        assert_eq!(redact_sensitive(&value, &[]), value);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefgh"), "****efgh");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret(""), "");
    }
}
