//! ImageMesh Server: turns uploaded images into 3D meshes.
//!
//! Main entry point that loads configuration, builds the logger, and starts
//! the HTTP server.

use imagemesh_core::{AppConfig, Logger};

#[tokio::main]
async fn main() {
    let env = std::env::var("IMAGEMESH_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let logger = match Logger::from_config(&config.logging) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        }
    };

    // Request tracing from tower-http goes to the global dispatcher.
    if tracing::dispatcher::set_global_default(logger.dispatch().clone()).is_err() {
        eprintln!("A global tracing subscriber was already installed");
    }

    logger.info(format!("Configuration loaded (env: {env})"));

    if let Err(e) = imagemesh_api::run_server(config, logger.clone()).await {
        logger.error(format!("Server error: {e}"));
        std::process::exit(1);
    }
}
