//! Request-scoped temp files.
//!
//! Every file created here is held by a [`TempPath`], so it is removed on
//! whichever path the request takes. On success both paths move into a
//! [`CleanupStream`], which deletes them once the body has been sent.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use futures::Stream;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;

use imagemesh_core::{AppError, AppResult, ErrorKind, Logger};

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Suffix given to saved uploads regardless of their content type.
pub const UPLOAD_SUFFIX: &str = ".png";

/// Returned when the request body exceeds the upload limit.
pub const UPLOAD_TOO_LARGE: &str = "Uploaded image is too large";

const TEMP_PREFIX: &str = "imagemesh-";

/// An uploaded image saved to disk. The file is removed on drop.
#[derive(Debug)]
pub struct UploadedImage {
    path: TempPath,
    size: u64,
    original_name: Option<String>,
}

impl UploadedImage {
    /// Location of the saved upload.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Filename sent by the client.
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// Hand the deletion guard to another owner.
    pub fn into_temp_path(self) -> TempPath {
        self.path
    }
}

/// Save the first `image` file part of `multipart` into `temp_dir`.
///
/// Parts without a filename are not files and are skipped. Returns
/// `Ok(None)` if the body has no image part; no file is created then.
pub async fn save_image_field(
    multipart: &mut Multipart,
    temp_dir: &Path,
) -> AppResult<Option<UploadedImage>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Missing image file in request"))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(String::from) else {
            continue;
        };
        return save_field(field, temp_dir, original_name).await.map(Some);
    }
    Ok(None)
}

async fn save_field(
    mut field: Field<'_>,
    temp_dir: &Path,
    original_name: String,
) -> AppResult<UploadedImage> {
    let (file, path) = create_temp_file(temp_dir, UPLOAD_SUFFIX)?.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, "Failed to read upload"))?
    {
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(UploadedImage {
        path,
        size,
        original_name: Some(original_name),
    })
}

/// Map a body read failure to a client error. Exceeding the body limit is
/// a 413, anything else a malformed request.
fn multipart_error(err: MultipartError, message: &str) -> AppError {
    let error = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large(UPLOAD_TOO_LARGE)
    } else {
        AppError::validation(message)
    };
    error.details(err.body_text())
}

/// Reserve a uniquely named, empty temp file with `suffix` in `temp_dir`.
pub fn create_output_path(temp_dir: &Path, suffix: &str) -> AppResult<TempPath> {
    create_temp_file(temp_dir, suffix).map(NamedTempFile::into_temp_path)
}

fn create_temp_file(temp_dir: &Path, suffix: &str) -> AppResult<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(temp_dir)
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create temp file in {}", temp_dir.display()),
                e,
            )
        })
}

/// Body stream that deletes its temp files after the last chunk.
///
/// Files are also removed if the stream is dropped early, e.g. when the
/// client disconnects mid-download.
pub struct CleanupStream<S> {
    inner: Option<S>,
    guards: Vec<TempPath>,
    logger: Logger,
}

impl<S> CleanupStream<S> {
    /// Wrap `inner`, taking ownership of `guards`.
    pub fn new(inner: S, guards: Vec<TempPath>, logger: Logger) -> Self {
        Self {
            inner: Some(inner),
            guards,
            logger,
        }
    }

    fn cleanup(&mut self) {
        // Close the reader first so the file can be removed on every platform.
        self.inner = None;
        for path in self.guards.drain(..) {
            let display = path.display().to_string();
            if let Err(e) = path.close() {
                self.logger
                    .warn(format!("Failed to remove temp file '{display}': {e}"));
            }
        }
    }
}

impl<S: Stream + Unpin> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.cleanup();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        if !self.guards.is_empty() {
            self.cleanup();
        }
    }
}
