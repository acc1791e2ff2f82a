//! # imagemesh-pipeline
//!
//! Turns an image on disk into a 3D mesh by delegating to a pre-trained
//! pipeline that lives in a local model directory.
//!
//! The pipeline itself is opaque. [`PipelineLoader`] resolves one from a
//! model directory and [`MeshPipeline`] runs it. The shipped implementation,
//! [`CommandPipeline`], drives an inference command described by a
//! `pipeline.toml` manifest. [`ModelConverter`] wraps whichever pipeline was
//! loaded, bounds concurrent runs, and stays disabled if loading failed.

pub mod command;
pub mod converter;
pub mod error;
pub mod manifest;
pub mod mesh;
pub mod metrics;
pub mod pipeline;

pub use command::{CommandPipeline, CommandPipelineLoader};
pub use converter::{ConverterOptions, ModelConverter};
pub use error::{ConversionError, MeshError};
pub use manifest::PipelineManifest;
pub use mesh::{Mesh, MeshFile, MeshFormat, TriangleMesh};
pub use metrics::{ConversionMetrics, MetricsSnapshot};
pub use pipeline::{LoadOptions, MeshPipeline, PipelineLoader};
