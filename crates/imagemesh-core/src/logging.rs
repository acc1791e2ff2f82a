//! The injected logging capability.
//!
//! A [`Logger`] owns its own `tracing` dispatcher. Components receive one at
//! construction and emit through it, so nothing depends on which subscriber
//! happens to be installed globally. Structured events use
//! [`Logger::in_scope`] with the ordinary `tracing` macros.

use std::fmt;

use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

use crate::config::LoggingConfig;
use crate::error::AppError;

/// Cloneable logging handle.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    component: &'static str,
}

impl Logger {
    /// Build a logger from configuration. `RUST_LOG` overrides `level`.
    pub fn from_config(config: &LoggingConfig) -> Result<Self, AppError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
                AppError::configuration(format!("Invalid log level '{}': {e}", config.level))
            })?,
        };

        let dispatch = match config.format.as_str() {
            "json" => Dispatch::new(
                subscriber_fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_thread_ids(true)
                    .finish(),
            ),
            "compact" => Dispatch::new(
                subscriber_fmt()
                    .compact()
                    .with_env_filter(filter)
                    .with_target(true)
                    .finish(),
            ),
            _ => Dispatch::new(
                subscriber_fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_target(true)
                    .finish(),
            ),
        };

        Ok(Self::from_dispatch(dispatch))
    }

    /// Wrap an existing dispatcher.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            component: "imagemesh",
        }
    }

    /// A logger that drops every event.
    pub fn disabled() -> Self {
        Self::from_dispatch(Dispatch::none())
    }

    /// Child logger tagging events with `component`.
    pub fn named(&self, component: &'static str) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
            component,
        }
    }

    /// Component name attached to events.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// The underlying dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger's dispatcher as the current default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Log an informational message.
    pub fn info(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::info!(component = self.component, "{message}"));
    }

    /// Log a warning.
    pub fn warn(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::warn!(component = self.component, "{message}"));
    }

    /// Log an error.
    pub fn error(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::error!(component = self.component, "{message}"));
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .finish()
    }
}
