//! # Mock Providers & Testing Guide
//!
//! In-memory providers for testing code that wires a [`Stack`](crate::Stack).
//! Every lifecycle call is appended to a shared [`Journal`], so a test can
//! assert the exact order in which the stack drove its components.
//!
//! | Type | Role | Knobs |
//! |------|------|-------|
//! | [`MockProvider`] | passive | `failing_init`, `failing_close`, `close_delay` |
//! | [`MockRunProvider`] | active | `failing_run`, `start_delay`, `depends_on` |
//!
//! ```rust
//! use provider_stack::mock::{journal, entries, MockProvider};
//! use provider_stack::Stack;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = journal();
//!     let mut stack = Stack::builder().with_trap_signals(false).build();
//!     stack.must_init(Arc::new(MockProvider::new("a", &log))).await;
//!     stack.must_init(Arc::new(MockProvider::new("b", &log))).await;
//!     stack.must_close().await;
//!
//!     assert_eq!(entries(&log), ["init:a", "init:b", "close:b", "close:a"]);
//! }
//! ```
//!
//! [`MockRunProvider::run`](crate::RunProvider::run) behaves like a real
//! serving loop: it marks itself running and then parks until `close` is
//! called.

use crate::error::ProviderError;
use crate::provider::{Provider, RunProvider, RunningFlag};
use crate::wait::wait_for_running;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared, ordered record of lifecycle calls.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Creates an empty journal.
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot of the journal entries.
pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn record(journal: &Journal, entry: String) {
    journal.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
}

// =============================================================================
// PASSIVE PROVIDER
// =============================================================================

/// A passive provider that records `init:<name>` and `close:<name>`.
pub struct MockProvider {
    name: String,
    journal: Journal,
    fail_init: bool,
    fail_close: bool,
    close_delay: Duration,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl MockProvider {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_init: false,
            fail_close: false,
            close_delay: Duration::ZERO,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// `init` returns an error instead of initializing.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// `close` returns an error instead of closing.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Sleeps for `delay` inside `close`, after recording the call.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), ProviderError> {
        record(&self.journal, format!("init:{}", self.name));
        if self.fail_init {
            return Err(ProviderError::custom("init failed"));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        record(&self.journal, format!("close:{}", self.name));
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        if self.fail_close {
            return Err(ProviderError::custom("close failed"));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// ACTIVE PROVIDER
// =============================================================================

/// A run provider that records `init`, `run` and `close`, and parks in `run`
/// until closed.
pub struct MockRunProvider {
    name: String,
    journal: Journal,
    running: RunningFlag,
    run_calls: AtomicUsize,
    fail_run: bool,
    start_delay: Duration,
    dependency: Option<(Arc<dyn RunProvider>, Duration)>,
    stop: CancellationToken,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl MockRunProvider {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            running: RunningFlag::new(),
            run_calls: AtomicUsize::new(0),
            fail_run: false,
            start_delay: Duration::ZERO,
            dependency: None,
            stop: CancellationToken::new(),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// `run` returns an error instead of serving.
    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    /// Sleeps for `delay` at the start of `run`, before anything else.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Waits for `other` to be running (bounded by `timeout`) before serving.
    pub fn depends_on(mut self, other: Arc<dyn RunProvider>, timeout: Duration) -> Self {
        self.dependency = Some((other, timeout));
        self
    }

    /// Number of times `run` was invoked.
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockRunProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), ProviderError> {
        record(&self.journal, format!("init:{}", self.name));
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        record(&self.journal, format!("close:{}", self.name));
        self.running.set_running(false);
        self.stop.cancel();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RunProvider for MockRunProvider {
    async fn run(&self) -> Result<(), ProviderError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        record(&self.journal, format!("run:{}", self.name));

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some((other, timeout)) = &self.dependency {
            wait_for_running(other.as_ref(), *timeout).await?;
        }
        if self.fail_run {
            return Err(ProviderError::custom("run failed"));
        }

        self.running.set_running(true);
        self.stop.cancelled().await;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.is_running()
    }
}
