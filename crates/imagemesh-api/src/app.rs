//! Application builder: wires router, middleware, and state into an Axum app.

use axum::Router;
use tower_http::trace::TraceLayer;

use imagemesh_core::{AppConfig, AppError, AppResult, Logger};
use imagemesh_pipeline::{CommandPipelineLoader, ConverterOptions, ModelConverter, PipelineLoader};

use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Load the converter and assemble the shared state.
///
/// A model that fails to load does not stop startup; `/convert` then
/// answers 503 until the service is restarted with a working model.
pub async fn build_state(
    config: AppConfig,
    logger: Logger,
    loader: &dyn PipelineLoader,
) -> AppResult<AppState> {
    let temp_dir = config.storage.effective_temp_dir();
    tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| {
        AppError::storage(format!(
            "Failed to create temp dir '{}': {e}",
            temp_dir.display()
        ))
    })?;

    let model_dir = config.model.model_dir();
    logger.info(format!(
        "Loading model '{}' from '{}'",
        config.model.model_name,
        model_dir.display()
    ));

    let converter = ModelConverter::load(
        model_dir,
        loader,
        ConverterOptions::from_config(&config.model),
        logger.clone(),
    )
    .await;
    if !converter.is_ready() {
        logger.warn("Serving without a model: conversions will be refused");
    }

    Ok(AppState::new(config, converter, logger))
}

/// Build the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Load the model, bind the listener, and serve until a shutdown signal.
pub async fn run_server(config: AppConfig, logger: Logger) -> AppResult<()> {
    logger.info(format!("Starting ImageMesh v{}", env!("CARGO_PKG_VERSION")));

    let addr = config.server.bind_addr();
    let loader = CommandPipelineLoader::new(logger.clone());
    let state = build_state(config, logger.clone(), &loader).await?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to '{addr}': {e}")))?;
    logger.info(format!("Listening on {addr}"));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(logger.clone()))
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    logger.info("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal(logger: Logger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger.error(format!("Failed to install Ctrl+C handler: {e}"));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                logger.error(format!("Failed to install SIGTERM handler: {e}"));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    logger.info("Shutdown signal received");
}
