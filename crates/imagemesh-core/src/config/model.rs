//! Model location and converter concurrency settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration for the image-to-mesh model.
///
/// The model directory is `<install_root>/<models_root>/<model_name>`.
/// An absolute `models_root` ignores `install_root`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ModelConfig {
    /// Name of the model directory under `models_root`.
    #[validate(length(min = 1))]
    pub model_name: String,
    /// Directory holding all model directories.
    pub models_root: PathBuf,
    /// Base for a relative `models_root`. Defaults to the executable's directory.
    pub install_root: Option<PathBuf>,
    /// Resolve the pipeline from disk only.
    pub local_files_only: bool,
    /// Number of conversions allowed to run at once.
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_conversions: usize,
    /// How long a request waits for a free conversion slot.
    #[validate(range(max = 3600))]
    pub queue_timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "image-to-mesh".to_string(),
            models_root: PathBuf::from("models"),
            install_root: None,
            local_files_only: true,
            max_concurrent_conversions: 1,
            queue_timeout_seconds: 30,
        }
    }
}

impl ModelConfig {
    /// Resolve the model directory.
    pub fn model_dir(&self) -> PathBuf {
        let root = if self.models_root.is_absolute() {
            self.models_root.clone()
        } else {
            self.effective_install_root().join(&self.models_root)
        };
        root.join(&self.model_name)
    }

    /// Resolve the install root used for relative paths.
    pub fn effective_install_root(&self) -> PathBuf {
        self.install_root.clone().unwrap_or_else(executable_dir)
    }

    /// Slot wait as a `Duration`.
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_seconds)
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
