//! The shared image-to-mesh converter.
//!
//! One [`ModelConverter`] is built at startup and injected into the request
//! layer. It tries to load a pipeline once; if that fails it stays disabled
//! for the life of the process and [`ModelConverter::convert`] returns
//! `Ok(None)`. Pipeline runs are bounded by a semaphore, and a request that
//! cannot get a slot within the queue timeout fails with
//! [`ConversionError::AtCapacity`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, SemaphorePermit};

use imagemesh_core::Logger;
use imagemesh_core::config::ModelConfig;

use crate::error::ConversionError;
use crate::mesh::Mesh;
use crate::metrics::ConversionMetrics;
use crate::pipeline::{LoadOptions, MeshPipeline, PipelineLoader};

/// Warning logged when a conversion is requested without a loaded model.
pub const MODEL_NOT_LOADED: &str = "2D-to-3D conversion requested but model is not loaded.";

/// Converter limits and load behaviour.
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    /// Pipeline runs allowed at once.
    pub max_concurrent: usize,
    /// How long a request waits for a free slot.
    pub queue_timeout: Duration,
    /// Resolve the pipeline from disk only.
    pub local_files_only: bool,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

impl ConverterOptions {
    /// Options from the `[model]` configuration section.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_conversions.max(1),
            queue_timeout: config.queue_timeout(),
            local_files_only: config.local_files_only,
        }
    }
}

/// Wraps an optional pipeline with concurrency limits and metrics.
#[derive(Debug)]
pub struct ModelConverter {
    model_dir: PathBuf,
    pipeline: Option<Arc<dyn MeshPipeline>>,
    limiter: Semaphore,
    max_slots: usize,
    queue_timeout: Duration,
    metrics: ConversionMetrics,
    logger: Logger,
}

impl ModelConverter {
    /// Load the pipeline in `model_dir`. Never fails: a load error is
    /// logged and leaves the converter disabled.
    pub async fn load(
        model_dir: PathBuf,
        loader: &dyn PipelineLoader,
        options: ConverterOptions,
        logger: Logger,
    ) -> Self {
        let logger = logger.named("converter");
        let load_options = LoadOptions {
            local_files_only: options.local_files_only,
        };

        let pipeline = match loader.from_pretrained(&model_dir, load_options).await {
            Ok(pipeline) => {
                logger.info(format!(
                    "Mesh pipeline loaded from '{}'",
                    model_dir.display()
                ));
                Some(pipeline)
            }
            Err(e) => {
                logger.warn(format!("Mesh pipeline not loaded: {e}"));
                None
            }
        };

        Self::build(model_dir, pipeline, options, logger)
    }

    /// A converter around an already-loaded pipeline.
    pub fn with_pipeline(
        model_dir: PathBuf,
        pipeline: Arc<dyn MeshPipeline>,
        options: ConverterOptions,
        logger: Logger,
    ) -> Self {
        Self::build(model_dir, Some(pipeline), options, logger.named("converter"))
    }

    /// A converter with no pipeline.
    pub fn disabled(model_dir: PathBuf, options: ConverterOptions, logger: Logger) -> Self {
        Self::build(model_dir, None, options, logger.named("converter"))
    }

    fn build(
        model_dir: PathBuf,
        pipeline: Option<Arc<dyn MeshPipeline>>,
        options: ConverterOptions,
        logger: Logger,
    ) -> Self {
        let max_slots = options.max_concurrent.max(1);
        Self {
            model_dir,
            pipeline,
            limiter: Semaphore::new(max_slots),
            max_slots,
            queue_timeout: options.queue_timeout,
            metrics: ConversionMetrics::new(),
            logger,
        }
    }

    /// Whether a pipeline is loaded.
    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Directory the pipeline was (or would have been) loaded from.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Conversion metrics.
    pub fn metrics(&self) -> &ConversionMetrics {
        &self.metrics
    }

    /// Free conversion slots right now.
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Convert the image at `image_path` into a mesh.
    ///
    /// Returns `Ok(None)` when no pipeline is loaded. Otherwise the first
    /// mesh of the pipeline's result is returned; pipeline errors pass
    /// through unchanged.
    pub async fn convert(
        &self,
        image_path: &Path,
    ) -> Result<Option<Box<dyn Mesh>>, ConversionError> {
        let Some(pipeline) = &self.pipeline else {
            self.logger.warn(MODEL_NOT_LOADED);
            self.metrics.record_unavailable();
            return Ok(None);
        };

        let _permit = self.acquire_slot().await?;

        let input_bytes = tokio::fs::metadata(image_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        self.metrics.record_started(input_bytes);
        let start = Instant::now();

        let result = pipeline.generate(image_path).await;
        match result.map(|meshes| meshes.into_iter().next()) {
            Ok(Some(mesh)) => {
                self.metrics.record_success(start.elapsed());
                Ok(Some(mesh))
            }
            Ok(None) => {
                self.metrics.record_failure();
                Err(ConversionError::EmptyResult)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>, ConversionError> {
        match tokio::time::timeout(self.queue_timeout, self.limiter.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ConversionError::SemaphoreClosed {
                reason: "conversion limiter closed".to_string(),
            }),
            Err(_) => {
                self.metrics.record_rejected();
                self.logger.in_scope(|| {
                    tracing::warn!(
                        max_slots = self.max_slots,
                        waited_ms = self.queue_timeout.as_millis() as u64,
                        "No conversion slot available"
                    )
                });
                Err(ConversionError::AtCapacity {
                    max_slots: self.max_slots,
                })
            }
        }
    }
}
