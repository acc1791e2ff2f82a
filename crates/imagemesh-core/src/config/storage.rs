//! Temp-file storage configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where request-scoped temp files are created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for uploaded images and exported meshes.
    /// Falls back to the system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective temp directory.
    pub fn effective_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
