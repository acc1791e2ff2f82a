//! The seam between the service and a pre-trained image-to-mesh pipeline.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConversionError;
use crate::mesh::Mesh;

/// Options passed when resolving a pipeline from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Never fetch weights or code from the network.
    pub local_files_only: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            local_files_only: true,
        }
    }
}

/// A loaded inference pipeline.
#[async_trait]
pub trait MeshPipeline: Send + Sync + std::fmt::Debug {
    /// Run inference on the image at `image` and return the generated meshes.
    async fn generate(&self, image: &Path) -> Result<Vec<Box<dyn Mesh>>, ConversionError>;
}

/// Resolves a [`MeshPipeline`] from a model directory.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    /// Load the pipeline stored in `model_dir`.
    async fn from_pretrained(
        &self,
        model_dir: &Path,
        options: LoadOptions,
    ) -> Result<Arc<dyn MeshPipeline>, ConversionError>;
}
