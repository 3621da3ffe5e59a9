//! # Lifecycle Contract
//!
//! Every component handed to the [`Stack`](crate::Stack) implements one of two roles:
//!
//! - [`Provider`]: passive. Only `init` and `close`.
//! - [`RunProvider`]: active. Adds a long-running `run` and a racy-safe
//!   `is_running` query.
//!
//! ## Architecture Note
//! Components are shared as `Arc<dyn Provider>` between the stack and any
//! dependent component that needs them, so every method takes `&self`. State a
//! component builds in `init` lives behind interior mutability.
//!
//! The running flag is the only piece of state written by one task (`run`) and
//! read by others ([`wait_for_running`](crate::wait_for_running), probes). Use
//! [`RunningFlag`] to hold it.

use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A unit of functionality with an `init`/`close` lifecycle.
///
/// `init` is invoked exactly once, in registration order, and must not block
/// indefinitely. `close` is invoked at most once, in reverse registration
/// order, and must tolerate a partially failed `init`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used to tag log events and errors.
    ///
    /// Defaults to the component's short type name (e.g. `Probes` instead of
    /// `provider_stack::probes::Probes`).
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Performs all setup dependents may rely on once registration returns.
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Releases everything acquired since `init`.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A [`Provider`] with a long-running main loop.
///
/// # Contract
/// - `run` only returns on a fatal error or a deliberate shutdown.
/// - `run` sets the running flag immediately before it blocks on its serving
///   loop, never earlier, so that a readiness wait observes the component as
///   soon as it can really serve.
/// - `is_running` is false before `run` is called and must be safe to call
///   from any task while `run` is executing.
#[async_trait]
pub trait RunProvider: Provider {
    async fn run(&self) -> Result<(), ProviderError>;

    fn is_running(&self) -> bool;
}

/// Atomic running flag for [`RunProvider`] implementations.
#[derive(Debug, Default)]
pub struct RunningFlag(AtomicBool);

impl RunningFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set_running(&self, running: bool) {
        self.0.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extracts just the type name (e.g. "Probes" instead of "provider_stack::probes::Probes").
///
/// Generic parameters are dropped as well, so `Cache<String>` becomes `Cache`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
