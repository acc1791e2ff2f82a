//! Tests for `POST /convert`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};

use imagemesh_api::build_state;
use imagemesh_api::handlers::convert::{
    AT_CAPACITY, CONVERSION_FAILED, MISSING_IMAGE, MODEL_UNAVAILABLE,
};
use imagemesh_api::temp::UPLOAD_TOO_LARGE;
use imagemesh_core::Logger;
use imagemesh_pipeline::{MeshPipeline, TriangleMesh};
use validator::Validate;

use crate::helpers::*;

#[tokio::test]
async fn test_convert_returns_mesh_attachment() {
    let app = TestApp::with_pipeline(Arc::new(TrianglePipeline));

    let (status, headers, body) = app.send(image_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"model.obj\""
    );
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        body.len().to_string().as_str()
    );

    let mesh = TriangleMesh::read_obj(&mut body.as_slice()).expect("OBJ body");
    assert_eq!(
        mesh.triangles().collect::<Vec<_>>(),
        vec![[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]
    );

    assert_eq!(app.temp_entries(), 0, "temp files must be removed after send");
}

#[tokio::test]
async fn test_repeated_conversions_are_identical() {
    let app = TestApp::with_pipeline(Arc::new(TrianglePipeline));

    let (_, _, first) = app.send(image_request()).await;
    let (_, _, second) = app.send(image_request()).await;
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(app.temp_entries(), 0);

    let metrics = app.state.converter.metrics().snapshot();
    assert_eq!(metrics.conversions_succeeded, 2);
    assert_eq!(metrics.total_output_bytes, 2 * first.len() as u64);
    assert!(metrics.total_input_bytes > 0);
}

#[tokio::test]
async fn test_convert_uses_configured_output() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&temp_dir);
    config.output.format = "stl".to_string();
    config.output.filename = "mesh.stl".to_string();
    config.output.mimetype = "application/sla".to_string();

    let converter = imagemesh_pipeline::ModelConverter::with_pipeline(
        config.model.model_dir(),
        Arc::new(TrianglePipeline),
        options(1, Duration::ZERO),
        Logger::disabled(),
    );
    let state = imagemesh_api::AppState::new(config, converter, Logger::disabled());
    let app = TestApp::from_state(state, temp_dir);

    let (status, headers, body) = app.send(image_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/sla");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"mesh.stl\""
    );
    // Binary STL: 80-byte header, triangle count, one 50-byte record.
    assert_eq!(body.len(), 84 + 50);
    assert_eq!(u32::from_le_bytes([body[80], body[81], body[82], body[83]]), 1);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_missing_image_field() {
    let app = TestApp::with_pipeline(Arc::new(TrianglePipeline));
    let png = png_bytes();

    let request = convert_request(&[Part {
        name: "picture",
        filename: Some("input.png"),
        data: &png,
    }]);
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], MISSING_IMAGE);
    assert_eq!(app.temp_entries(), 0);
    assert_eq!(app.state.converter.metrics().snapshot().conversions_started, 0);
}

#[tokio::test]
async fn test_image_field_without_filename_is_not_a_file() {
    let app = TestApp::with_pipeline(Arc::new(TrianglePipeline));

    let request = convert_request(&[Part {
        name: "image",
        filename: None,
        data: b"not a file",
    }]);
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], MISSING_IMAGE);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_missing_image() {
    let app = TestApp::with_pipeline(Arc::new(TrianglePipeline));

    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "x"}"#))
        .expect("build request");
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], MISSING_IMAGE);
}

#[tokio::test]
async fn test_disabled_converter_returns_503() {
    let app = TestApp::disabled();

    let (status, json) = app.send_json(image_request()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], MODEL_UNAVAILABLE);
    assert!(json.get("details").is_none());
    assert_eq!(app.temp_entries(), 0, "upload must not leak on 503");
}

#[tokio::test]
async fn test_disabled_converter_logs_refusal() {
    let logs = LogCapture::default();
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);
    let converter = imagemesh_pipeline::ModelConverter::disabled(
        config.model.model_dir(),
        options(1, Duration::ZERO),
        logs.logger(),
    );
    let state = imagemesh_api::AppState::new(config, converter, logs.logger());
    let app = TestApp::from_state(state, temp_dir);

    let (status, _) = app.send_json(image_request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let output = logs.contents();
    let refusal = output
        .lines()
        .find(|line| line.contains("WARN") && line.contains("not loaded"))
        .unwrap_or_else(|| panic!("no warning logged for refused conversion:\n{output}"));
    assert_eq!(
        app.state.converter.metrics().snapshot().conversions_unavailable,
        1
    );
}

#[tokio::test]
async fn test_content_disposition_quotes_configured_filename() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&temp_dir);
    config.output.filename = "bunny mesh.obj".to_string();
    assert!(config.validate().is_ok());

    let converter = imagemesh_pipeline::ModelConverter::with_pipeline(
        config.model.model_dir(),
        Arc::new(TrianglePipeline),
        options(1, Duration::ZERO),
        Logger::disabled(),
    );
    let state = imagemesh_api::AppState::new(config, converter, Logger::disabled());
    let app = TestApp::from_state(state, temp_dir);

    let (status, headers, _) = app.send(image_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bunny mesh.obj\""
    );
}

#[tokio::test]
async fn test_model_load_failure_keeps_serving() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);

    let state = build_state(config, Logger::disabled(), &MissingModelLoader)
        .await
        .expect("startup must not fail on a missing model");
    assert!(!state.converter.is_ready());
    let app = TestApp::from_state(state, temp_dir);

    let (status, json) = app.send_json(image_request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], MODEL_UNAVAILABLE);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_pipeline_failure_returns_500_with_details() {
    let app = TestApp::with_pipeline(Arc::new(FailingPipeline));

    let (status, json) = app.send_json(image_request()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], CONVERSION_FAILED);
    let details = json["details"].as_str().expect("details");
    assert!(details.contains("CUDA out of memory"));
    assert_eq!(app.temp_entries(), 0);
    assert_eq!(app.state.converter.metrics().snapshot().conversions_failed, 1);
}

#[tokio::test]
async fn test_busy_converter_rejects_at_capacity() {
    let pipeline = Arc::new(GatedPipeline::default());
    let app = TestApp::build(
        Some(pipeline.clone() as Arc<dyn MeshPipeline>),
        options(1, Duration::ZERO),
    );

    let router = app.router.clone();
    let first = tokio::spawn(async move {
        use tower::ServiceExt;
        router.oneshot(image_request()).await.expect("first request")
    });
    pipeline.entered.notified().await;
    assert_eq!(app.state.converter.available_slots(), 0);

    let (status, json) = app.send_json(image_request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], AT_CAPACITY);
    assert!(json["details"].as_str().is_some());

    pipeline.release.notify_one();
    let response = first.await.expect("join");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(!body.is_empty());

    assert_eq!(app.temp_entries(), 0);
    assert_eq!(app.state.converter.available_slots(), 1);
    assert_eq!(app.state.converter.metrics().snapshot().conversions_rejected, 1);
}

#[tokio::test]
async fn test_queued_request_runs_when_slot_frees() {
    let pipeline = Arc::new(GatedPipeline::default());
    let app = TestApp::build(
        Some(pipeline.clone() as Arc<dyn MeshPipeline>),
        options(1, Duration::from_secs(30)),
    );

    let router = app.router.clone();
    let first = tokio::spawn(async move {
        use tower::ServiceExt;
        router.oneshot(image_request()).await.expect("first request")
    });
    pipeline.entered.notified().await;

    let router = app.router.clone();
    let second = tokio::spawn(async move {
        use tower::ServiceExt;
        router.oneshot(image_request()).await.expect("second request")
    });

    pipeline.release.notify_one();
    assert_eq!(first.await.expect("join").status(), StatusCode::OK);

    pipeline.entered.notified().await;
    pipeline.release.notify_one();
    assert_eq!(second.await.expect("join").status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&temp_dir);
    config.server.max_upload_mb = 1;

    let converter = imagemesh_pipeline::ModelConverter::with_pipeline(
        config.model.model_dir(),
        Arc::new(TrianglePipeline),
        options(1, Duration::ZERO),
        Logger::disabled(),
    );
    let state = imagemesh_api::AppState::new(config, converter, Logger::disabled());
    let app = TestApp::from_state(state, temp_dir);

    let big = vec![0u8; 2 * 1024 * 1024];
    let request = convert_request(&[Part {
        name: "image",
        filename: Some("huge.png"),
        data: &big,
    }]);
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"], UPLOAD_TOO_LARGE);
    assert_eq!(app.temp_entries(), 0);
    assert_eq!(app.state.converter.metrics().snapshot().conversions_started, 0);
}
