//! Application state shared across all handlers.

use std::path::PathBuf;
use std::sync::Arc;

use imagemesh_core::{AppConfig, Logger};
use imagemesh_pipeline::ModelConverter;

/// Dependencies injected into every handler via `State<AppState>`.
///
/// All fields are cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The single converter shared by all requests.
    pub converter: Arc<ModelConverter>,
    /// Logger for request handling.
    pub logger: Logger,
    /// Directory for request-scoped temp files.
    pub temp_dir: PathBuf,
}

impl AppState {
    /// Assemble state from its parts.
    pub fn new(config: AppConfig, converter: ModelConverter, logger: Logger) -> Self {
        let temp_dir = config.storage.effective_temp_dir();
        Self {
            config: Arc::new(config),
            converter: Arc::new(converter),
            logger: logger.named("api"),
            temp_dir,
        }
    }
}
