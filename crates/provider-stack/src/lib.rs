//! # Provider Stack
//!
//! Lifecycle coordination for a process built out of independently
//! implemented components ("providers"): database connections, servers,
//! tracers, metrics exporters. The crate guarantees:
//!
//! - a deterministic startup order (registration order),
//! - concurrent execution of every long-running component,
//! - a deterministic shutdown in reverse registration order,
//! - a way for one component to wait until another is serving.
//!
//! It also ships a health-probe aggregator that exposes the composite health
//! of the process over HTTP for an external orchestrator.
//!
//! ## Architecture Overview
//!
//! 1. **Contract** ([`Provider`], [`RunProvider`]) - what every component implements
//! 2. **Orchestrator** ([`Stack`]) - owns the ordered list and drives `init`, `run`, `close`
//! 3. **Synchronization** ([`wait_for_running`]) - bounded readiness wait between components
//! 4. **Health** ([`Probes`]) - liveness and readiness endpoints fed by other components
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provider_stack::{App, AppConfig, Probes, ProbesConfig, Stack, Tracing, TracingConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stack = Stack::new();
//!
//!     stack.must_init(Arc::new(Tracing::new(TracingConfig::from_env()?))).await;
//!
//!     let app = Arc::new(App::new(AppConfig::from_env()?));
//!     stack.must_init(app.clone()).await;
//!
//!     let probes = Arc::new(Probes::new(ProbesConfig::from_env()?).with_app(app));
//!     stack.must_init_runnable(probes).await;
//!
//!     // Blocks until SIGINT/SIGTERM, then closes everything in reverse order.
//!     stack.must_run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Policy
//!
//! | Phase | Fallible API | `must_*` API |
//! |-------|--------------|--------------|
//! | init | `Err(StackError::Init)`, component not registered | logs and panics |
//! | run | `Err(StackError::Run)`, nothing closed | logs and panics |
//! | close | `Err(StackError::Close)`, remaining components skipped | logs and panics |
//!
//! A [`wait_for_running`] timeout is an ordinary [`ProviderError`]; the
//! waiting component decides whether it is fatal for itself. Probe failures
//! are never fatal: they only turn an endpoint into a 503.
//!
//! ## Testing
//!
//! See the [`mock`] module for journal-recording providers.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock;
pub mod probes;
pub mod provider;
mod signal;
pub mod stack;
pub mod wait;

pub use app::App;
pub use config::{AppConfig, ConfigError, EnvMsDuration, LogFormat, ProbesConfig, TracingConfig};
pub use error::{BoxError, ProviderError, StackError};
pub use logging::Tracing;
pub use probes::{ProbeResult, Probes};
pub use provider::{Provider, RunProvider, RunningFlag};
pub use stack::{Stack, StackBuilder};
pub use wait::{wait_for_running, POLL_INTERVAL};
