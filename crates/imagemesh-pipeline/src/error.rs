//! Unified error types for pipeline loading, inference, and mesh export.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing mesh files.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The target path has no extension or an extension we cannot write.
    #[error("Unsupported mesh format: '{0}'")]
    UnsupportedFormat(String),

    /// A Wavefront OBJ source could not be parsed.
    #[error("OBJ parse error: {0}")]
    Obj(#[from] tobj::LoadError),

    /// A face references a vertex that does not exist.
    #[error("Face references vertex {index}, but the mesh has {count} vertices")]
    VertexOutOfRange {
        /// Offending zero-based index.
        index: i64,
        /// Vertex count at the time of the reference.
        count: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unified error type for everything between an uploaded image and a mesh.
#[derive(Debug, Error)]
pub enum ConversionError {
    // --- Loading errors ---
    /// Model directory does not exist.
    #[error("Model directory not found: {path}")]
    ModelDirNotFound {
        /// The resolved model directory.
        path: PathBuf,
    },

    /// Pipeline manifest missing or malformed.
    #[error("Invalid pipeline manifest in {path}: {reason}")]
    ManifestInvalid {
        /// The model directory that was searched.
        path: PathBuf,
        /// Parser or validation message.
        reason: String,
    },

    /// Inference command could not be found.
    #[error("Inference command not found: {0}")]
    CommandNotFound(String),

    // --- Inference errors ---
    /// Inference process timed out.
    #[error("Inference timed out after {0} seconds")]
    Timeout(u64),

    /// Inference process exited with a non-zero status.
    #[error("Inference failed with exit code {code}: {stderr}")]
    ProcessFailed {
        /// The exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured and truncated stderr.
        stderr: String,
    },

    /// Inference finished but produced no mesh file.
    #[error("Expected mesh output not created: {}", .0.display())]
    OutputMissing(PathBuf),

    /// Pipeline returned an empty result collection.
    #[error("Pipeline returned no meshes")]
    EmptyResult,

    // --- Capacity errors ---
    /// No conversion slot became free in time.
    #[error("Server at capacity: all {max_slots} conversion slots are in use")]
    AtCapacity {
        /// Total number of conversion slots.
        max_slots: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("Internal semaphore error: {reason}")]
    SemaphoreClosed {
        /// Description of which semaphore failed.
        reason: String,
    },

    // --- Generic errors ---
    /// Mesh export or parse error.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tokio task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ConversionError {
    /// Whether the error means "try again later" rather than "this failed".
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::AtCapacity { .. })
    }
}
