//! Image-to-mesh conversion handler.

use std::fmt;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use imagemesh_core::{AppError, Logger};

use crate::state::AppState;
use crate::temp::{self, CleanupStream};

/// Returned when the request carries no `image` file.
pub const MISSING_IMAGE: &str = "Missing image file in request";

/// Returned when no pipeline is loaded.
pub const MODEL_UNAVAILABLE: &str = "3D model conversion is not available: model is not loaded.";

/// Returned when every conversion slot stayed busy for the queue timeout.
pub const AT_CAPACITY: &str = "3D model conversion is at capacity, retry later.";

/// Returned when the pipeline or the export fails.
pub const CONVERSION_FAILED: &str = "Failed to generate 3D model";

/// POST /convert
///
/// Accepts `multipart/form-data` with an `image` file part and responds
/// with the generated mesh as an attachment.
pub async fn convert_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let logger = &state.logger;

    let upload = match multipart {
        Ok(mut multipart) => temp::save_image_field(&mut multipart, &state.temp_dir).await?,
        Err(rejection) => {
            logger.in_scope(|| tracing::debug!(%rejection, "Request body is not multipart"));
            None
        }
    };
    let Some(upload) = upload else {
        logger.warn(MISSING_IMAGE);
        return Err(AppError::validation(MISSING_IMAGE));
    };

    logger.in_scope(|| {
        tracing::debug!(
            path = %upload.path().display(),
            size = upload.size(),
            original_name = upload.original_name().unwrap_or_default(),
            "Saved uploaded image"
        )
    });

    let mesh = match state.converter.convert(upload.path()).await {
        Ok(Some(mesh)) => mesh,
        Ok(None) => return Err(AppError::service_unavailable(MODEL_UNAVAILABLE)),
        Err(e) if e.is_capacity() => {
            logger.warn(format!("Rejected conversion: {e}"));
            return Err(AppError::service_unavailable(AT_CAPACITY).details(e.to_string()));
        }
        Err(e) => return Err(conversion_failed(logger, e)),
    };

    let output = &state.config.output;
    let output_path = temp::create_output_path(&state.temp_dir, &output.suffix())
        .map_err(|e| conversion_failed(logger, e))?;

    let target = output_path.to_path_buf();
    match tokio::task::spawn_blocking(move || mesh.export(&target)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(conversion_failed(logger, e)),
        Err(e) => return Err(conversion_failed(logger, e)),
    }

    let file = tokio::fs::File::open(&output_path)
        .await
        .map_err(|e| conversion_failed(logger, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| conversion_failed(logger, e))?
        .len();
    state.converter.metrics().record_output(size);

    logger.info(format!(
        "2D image converted to 3D model and returned as .{}",
        output.format
    ));

    let body = Body::from_stream(CleanupStream::new(
        ReaderStream::new(file),
        vec![upload.into_temp_path(), output_path],
        logger.clone(),
    ));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, output.mimetype.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", output.filename),
        )
        .header(header::CONTENT_LENGTH, size)
        .body(body)
        .map_err(|e| AppError::internal(format!("Response build failed: {e}")))?;

    Ok(response)
}

fn conversion_failed(logger: &Logger, err: impl fmt::Display) -> AppError {
    logger.error(format!("Error during 2D to 3D conversion: {err}"));
    AppError::internal(CONVERSION_FAILED).details(err.to_string())
}
