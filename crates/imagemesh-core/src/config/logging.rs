//! Logging configuration.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: `"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`,
    /// or any `EnvFilter` expression. `RUST_LOG` takes precedence.
    #[validate(length(min = 1))]
    pub level: String,
    /// Output format: `"json"`, `"pretty"` or `"compact"`.
    #[validate(custom(function = "validate_format"))]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

fn validate_format(format: &str) -> Result<(), ValidationError> {
    match format {
        "json" | "pretty" | "compact" => Ok(()),
        _ => Err(ValidationError::new("unknown_log_format")),
    }
}
