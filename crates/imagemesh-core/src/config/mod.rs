//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! `config/default.*`, an environment overlay, and `IMAGEMESH__*`
//! environment variables. Every field has a default, so an empty source
//! yields a runnable configuration.

pub mod app;
pub mod logging;
pub mod model;
pub mod output;
pub mod storage;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::app::{CorsConfig, ServerConfig};
pub use self::logging::LoggingConfig;
pub use self::model::ModelConfig;
pub use self::output::OutputConfig;
pub use self::storage::StorageConfig;

use crate::error::AppError;

/// Root application configuration. Read-only once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Model location and converter limits.
    #[validate(nested)]
    pub model: ModelConfig,
    /// Returned mesh format and download metadata.
    #[validate(nested)]
    pub output: OutputConfig,
    /// Temp-file settings.
    pub storage: StorageConfig,
    /// Logging settings.
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and the environment.
    ///
    /// Merges `config/default`, `config/{env}`, and environment variables
    /// prefixed with `IMAGEMESH__` (e.g. `IMAGEMESH__OUTPUT__FORMAT=stl`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("IMAGEMESH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.validate()?;
        Ok(app)
    }
}
