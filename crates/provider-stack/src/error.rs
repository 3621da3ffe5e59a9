//! # Lifecycle Errors
//!
//! This module defines the two error layers used throughout the stack:
//!
//! - [`ProviderError`] is what a single component returns from `init`, `run`,
//!   `close`, a readiness wait, or a probe.
//! - [`StackError`] is what the orchestrator reports. It names the component
//!   and the lifecycle phase that failed, and wraps the component's error.

use std::sync::Arc;
use std::time::Duration;

/// Boxed error for wrapping third-party client errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by a single provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("time exceeded for {name} to run (waited {timeout:?})")]
    WaitTimeout { name: String, timeout: Duration },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl ProviderError {
    pub fn custom(message: impl Into<String>) -> Self {
        ProviderError::Custom(message.into())
    }
}

/// Errors raised by the [`Stack`](crate::Stack) while driving a lifecycle phase.
///
/// The source is shared behind an `Arc` so that every caller of an
/// idempotent phase (for example two concurrent `close` calls) observes the
/// same outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StackError {
    #[error("failed to init {component}: {source}")]
    Init {
        component: String,
        #[source]
        source: Arc<ProviderError>,
    },
    #[error("failed to run {component}: {source}")]
    Run {
        component: String,
        #[source]
        source: Arc<ProviderError>,
    },
    #[error("failed to close {component}: {source}")]
    Close {
        component: String,
        #[source]
        source: Arc<ProviderError>,
    },
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(String),
    #[error("lifecycle task aborted: {0}")]
    Aborted(String),
}

impl StackError {
    /// Name of the component that triggered the error, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            StackError::Init { component, .. }
            | StackError::Run { component, .. }
            | StackError::Close { component, .. } => Some(component),
            StackError::Signal(_) | StackError::Aborted(_) => None,
        }
    }
}
