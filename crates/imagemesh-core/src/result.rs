//! Crate-wide result alias.

use crate::error::AppError;

/// Result type used at the application boundary.
pub type AppResult<T> = Result<T, AppError>;
