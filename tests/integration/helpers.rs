//! Shared test helpers for integration tests.

use std::io::{self, Cursor};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;
use tracing::Dispatch;

use imagemesh_api::{AppState, build_app};
use imagemesh_core::{AppConfig, Logger};
use imagemesh_pipeline::{
    ConversionError, ConverterOptions, LoadOptions, Mesh, MeshPipeline, ModelConverter,
    PipelineLoader, TriangleMesh,
};

pub const BOUNDARY: &str = "imagemesh-test-boundary";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, for inspecting the converter
    pub state: AppState,
    /// Directory holding every request-scoped temp file
    pub temp_dir: TempDir,
}

impl TestApp {
    /// App whose converter wraps `pipeline`, one slot, no queueing.
    pub fn with_pipeline(pipeline: Arc<dyn MeshPipeline>) -> Self {
        Self::build(Some(pipeline), options(1, Duration::ZERO))
    }

    /// App whose converter has no pipeline.
    pub fn disabled() -> Self {
        Self::build(None, options(1, Duration::ZERO))
    }

    /// App with explicit converter options.
    pub fn build(pipeline: Option<Arc<dyn MeshPipeline>>, options: ConverterOptions) -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(&temp_dir);
        let model_dir = config.model.model_dir();
        let converter = match pipeline {
            Some(pipeline) => {
                ModelConverter::with_pipeline(model_dir, pipeline, options, Logger::disabled())
            }
            None => ModelConverter::disabled(model_dir, options, Logger::disabled()),
        };
        let state = AppState::new(config, converter, Logger::disabled());
        Self::from_state(state, temp_dir)
    }

    /// Wrap already-built state.
    pub fn from_state(state: AppState, temp_dir: TempDir) -> Self {
        Self {
            router: build_app(state.clone()),
            state,
            temp_dir,
        }
    }

    /// Send a request and return the full response.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, headers, body.to_vec())
    }

    /// Send a request and parse its body as JSON.
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = serde_json::from_slice(&body).expect("Failed to parse JSON body");
        (status, json)
    }

    /// Number of entries left in the temp directory.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path())
            .expect("read temp dir")
            .count()
    }
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Plain-text logger writing into this capture.
    pub fn logger(&self) -> Logger {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Logger::from_dispatch(Dispatch::new(subscriber))
    }

    /// Everything logged so far.
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Default config pointing temp files at `temp_dir`.
pub fn test_config(temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.temp_dir = Some(temp_dir.path().to_path_buf());
    config.model.install_root = Some(temp_dir.path().to_path_buf());
    config
}

pub fn options(max_concurrent: usize, queue_timeout: Duration) -> ConverterOptions {
    ConverterOptions {
        max_concurrent,
        queue_timeout,
        local_files_only: true,
    }
}

/// A 10x10 PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(10, 10, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// One part of a multipart body.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

/// Encode `parts` as `multipart/form-data`.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n\
                         Content-Type: image/png\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST /convert with a multipart body.
pub fn convert_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("build request")
}

/// POST /convert carrying a PNG in the `image` field.
pub fn image_request() -> Request<Body> {
    let png = png_bytes();
    convert_request(&[Part {
        name: "image",
        filename: Some("input.png"),
        data: &png,
    }])
}

/// Returns a single triangle.
#[derive(Debug)]
pub struct TrianglePipeline;

#[async_trait]
impl MeshPipeline for TrianglePipeline {
    async fn generate(&self, image: &Path) -> Result<Vec<Box<dyn Mesh>>, ConversionError> {
        assert!(image.is_file(), "upload must exist while the pipeline runs");
        let mesh = TriangleMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
        )?;
        Ok(vec![Box::new(mesh)])
    }
}

/// Always fails like a crashed inference process.
#[derive(Debug)]
pub struct FailingPipeline;

#[async_trait]
impl MeshPipeline for FailingPipeline {
    async fn generate(&self, _image: &Path) -> Result<Vec<Box<dyn Mesh>>, ConversionError> {
        Err(ConversionError::ProcessFailed {
            code: 2,
            stderr: "CUDA out of memory".to_string(),
        })
    }
}

/// Blocks inside `generate` until released.
#[derive(Debug, Default)]
pub struct GatedPipeline {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl MeshPipeline for GatedPipeline {
    async fn generate(&self, image: &Path) -> Result<Vec<Box<dyn Mesh>>, ConversionError> {
        self.entered.notify_one();
        self.release.notified().await;
        TrianglePipeline.generate(image).await
    }
}

/// Loader that never finds a model.
pub struct MissingModelLoader;

#[async_trait]
impl PipelineLoader for MissingModelLoader {
    async fn from_pretrained(
        &self,
        model_dir: &Path,
        _options: LoadOptions,
    ) -> Result<Arc<dyn MeshPipeline>, ConversionError> {
        Err(ConversionError::ModelDirNotFound {
            path: model_dir.to_path_buf(),
        })
    }
}
