//! # imagemesh-api
//!
//! HTTP API layer for ImageMesh built on Axum.
//!
//! Exposes `POST /convert`, which accepts a multipart image upload and
//! streams back the generated mesh, and `GET /health`. Request-scoped temp
//! files are owned by the response body and removed once it is sent.

pub mod app;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod temp;

pub use app::{build_app, build_state, run_server};
pub use state::AppState;
