//! # imagemesh-core
//!
//! Core crate for ImageMesh. Contains configuration schemas, the unified
//! error system, and the [`Logger`] capability handed to every component.
//!
//! This crate has **no** internal dependencies on other ImageMesh crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;

pub use config::AppConfig;
pub use error::{AppError, ErrorKind};
pub use logging::Logger;
pub use result::AppResult;
