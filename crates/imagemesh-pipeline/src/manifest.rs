//! The `pipeline.*` manifest stored in a model directory.
//!
//! ```toml
//! command = "python3"
//! args = ["infer.py", "--image", "{input}", "--out", "{output}"]
//! output_format = "obj"
//! timeout_seconds = 900
//!
//! [env]
//! OMP_NUM_THREADS = "8"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::ConversionError;
use crate::mesh::MeshFormat;

/// File stem searched for in the model directory.
pub const MANIFEST_STEM: &str = "pipeline";

/// How to invoke the inference command for a model.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineManifest {
    /// Executable, absolute, relative to the model directory, or on `PATH`.
    #[validate(length(min = 1))]
    pub command: String,

    /// Arguments with `{input}`, `{output}`, `{output_dir}`, `{format}` and
    /// `{model_dir}` placeholders.
    #[serde(default)]
    pub args: Vec<String>,

    /// Format the command writes.
    #[serde(default = "default_output_format")]
    #[validate(custom(function = "validate_output_format"))]
    pub output_format: String,

    /// Timeout in seconds for one inference run.
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(min = 1, max = 86400))]
    pub timeout_seconds: u64,

    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_output_format() -> String {
    "obj".to_string()
}

fn default_timeout_seconds() -> u64 {
    600
}

fn validate_output_format(format: &str) -> Result<(), ValidationError> {
    MeshFormat::from_extension(format)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("unsupported_mesh_format"))
}

impl PipelineManifest {
    /// Read and validate the manifest in `model_dir`.
    ///
    /// Any extension the `config` crate understands is accepted
    /// (`pipeline.toml`, `pipeline.json`, `pipeline.yaml`, ...).
    pub fn load(model_dir: &Path) -> Result<Self, ConversionError> {
        let invalid = |reason: String| ConversionError::ManifestInvalid {
            path: model_dir.to_path_buf(),
            reason,
        };

        let stem = model_dir.join(MANIFEST_STEM);
        let stem = stem
            .to_str()
            .ok_or_else(|| invalid("model path is not valid UTF-8".to_string()))?;

        let manifest: Self = config::Config::builder()
            .add_source(config::File::with_name(stem).required(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| invalid(e.to_string()))?;

        manifest.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(manifest)
    }

    /// Parsed output format.
    pub fn format(&self) -> MeshFormat {
        MeshFormat::from_extension(&self.output_format).unwrap_or(MeshFormat::Obj)
    }

    /// The command resolved against the model directory when it names a path.
    pub fn command_path(&self, model_dir: &Path) -> PathBuf {
        let command = Path::new(&self.command);
        if command.is_absolute() || command.components().count() == 1 {
            command.to_path_buf()
        } else {
            model_dir.join(command)
        }
    }
}
