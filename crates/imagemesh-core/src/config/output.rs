//! Settings for the mesh file returned to the client.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Output mesh format and download metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OutputConfig {
    /// File extension passed to the mesh exporter (`obj`, `stl`).
    #[validate(length(min = 1, max = 16))]
    pub format: String,
    /// Download name sent in `Content-Disposition`. Quotes, backslashes and
    /// control characters are rejected since the value is sent quoted.
    #[validate(length(min = 1, max = 255), custom(function = "validate_filename"))]
    pub filename: String,
    /// Value of the `Content-Type` header.
    #[validate(length(min = 1))]
    pub mimetype: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "obj".to_string(),
            filename: "model.obj".to_string(),
            mimetype: "text/plain".to_string(),
        }
    }
}

impl OutputConfig {
    /// Temp file suffix for exported meshes, e.g. `.obj`.
    pub fn suffix(&self) -> String {
        format!(".{}", self.format.trim_start_matches('.'))
    }
}

fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename
        .chars()
        .any(|c| c == '"' || c == '\\' || c.is_control())
    {
        return Err(ValidationError::new("unquotable_filename"));
    }
    Ok(())
}
