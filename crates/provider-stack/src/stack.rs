//! # Stack Orchestrator
//!
//! The [`Stack`] owns the ordered list of components and drives the three
//! lifecycle phases:
//!
//! 1. **Init** - sequential, in registration order. A component may only
//!    depend on components registered before it.
//! 2. **Run** - every [`RunProvider`] is launched on its own tokio task. There
//!    is no ordering between launches; components that need another one live
//!    use [`wait_for_running`](crate::wait_for_running).
//! 3. **Close** - sequential, in reverse registration order, triggered by an
//!    interrupt, [`Stack::request_shutdown`], or an explicit [`Stack::close`].
//!
//! ```rust,ignore
//! let mut stack = Stack::new();
//! stack.must_init(tracing_provider).await;
//! stack.must_init(app.clone()).await;
//! stack.must_init_runnable(probes.clone()).await;
//! stack.must_init_runnable(server).await;
//!
//! // Blocks until SIGINT/SIGTERM, then closes everything in reverse order.
//! stack.must_run().await;
//! ```
//!
//! ## Failure Semantics
//! Every phase has a fallible form (`init`, `run`, `close`) returning
//! [`StackError`] and a `must_*` form that logs the error and panics. Process
//! entry points use the `must_*` forms. A failing `run` is reported back from its task to
//! the caller of `run`, so the panic happens on the caller's task (normally
//! `main`) instead of silently killing a background task.

use crate::error::{ProviderError, StackError};
use crate::provider::{Provider, RunProvider};
use crate::signal;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A registered component, tagged with its capability at registration time.
#[derive(Clone)]
enum Registered {
    Passive(Arc<dyn Provider>),
    Runnable(Arc<dyn RunProvider>),
}

impl Registered {
    fn name(&self) -> &str {
        match self {
            Registered::Passive(p) => p.name(),
            Registered::Runnable(p) => p.name(),
        }
    }

    async fn init(&self) -> Result<(), ProviderError> {
        match self {
            Registered::Passive(p) => p.init().await,
            Registered::Runnable(p) => p.init().await,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        match self {
            Registered::Passive(p) => p.close().await,
            Registered::Runnable(p) => p.close().await,
        }
    }

    fn as_runnable(&self) -> Option<&Arc<dyn RunProvider>> {
        match self {
            Registered::Passive(_) => None,
            Registered::Runnable(p) => Some(p),
        }
    }
}

// =============================================================================
// PHASES
// =============================================================================

type PhaseOutcome = Shared<BoxFuture<'static, Result<(), StackError>>>;

/// A lifecycle phase that executes exactly once.
///
/// The first caller spawns the work on its own task; every caller, including
/// the first, awaits a shared handle to its outcome. Dropping a caller's
/// future never cancels or restarts the phase.
#[derive(Default)]
struct Phase(OnceLock<PhaseOutcome>);

impl Phase {
    fn start<F>(&self, work: F) -> PhaseOutcome
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), StackError>>,
    {
        self.0
            .get_or_init(|| {
                let task = tokio::spawn(work());
                async move {
                    task.await
                        .unwrap_or_else(|e| Err(StackError::Aborted(e.to_string())))
                }
                .boxed()
                .shared()
            })
            .clone()
    }
}

/// State shared between a [`Stack`] and the tasks driving its phases.
struct Lifecycle {
    trap_signals: bool,
    shutdown: CancellationToken,
    run_phase: Phase,
    close_phase: Phase,
}

impl Lifecycle {
    fn run(self: &Arc<Self>, providers: Arc<[Registered]>) -> PhaseOutcome {
        let lifecycle = self.clone();
        self.run_phase
            .start(move || launch_and_wait(lifecycle, providers).boxed())
    }

    fn close(&self, providers: Arc<[Registered]>) -> PhaseOutcome {
        let shutdown = self.shutdown.clone();
        self.close_phase
            .start(move || close_all(shutdown, providers).boxed())
    }
}

/// Builder for a [`Stack`].
#[derive(Debug, Clone)]
pub struct StackBuilder {
    trap_signals: bool,
}

impl Default for StackBuilder {
    fn default() -> Self {
        Self { trap_signals: true }
    }
}

impl StackBuilder {
    /// Whether `run` listens for SIGINT/SIGTERM (default: true).
    ///
    /// Disable it in tests or when the embedding application owns signal
    /// handling and calls [`Stack::request_shutdown`] itself.
    pub fn with_trap_signals(mut self, trap_signals: bool) -> Self {
        self.trap_signals = trap_signals;
        self
    }

    pub fn build(self) -> Stack {
        Stack {
            providers: Vec::new(),
            lifecycle: Arc::new(Lifecycle {
                trap_signals: self.trap_signals,
                shutdown: CancellationToken::new(),
                run_phase: Phase::default(),
                close_phase: Phase::default(),
            }),
        }
    }
}

/// The lifecycle orchestrator.
///
/// # Architecture Note
/// Registration takes `&mut self` while `run` and `close` take `&self`. Once a
/// stack is shared (e.g. behind an `Arc` so that another task can call
/// `close`), nothing can be appended anymore, which is exactly the "init
/// strictly before run/close" rule. The component list itself therefore needs
/// no lock.
///
/// `run` and `close` each execute on a task of their own, fed with a snapshot
/// of the component list. Callers only await the outcome, so a caller that
/// gives up (a `select!`, a timeout) leaves the phase running to completion.
///
/// The phase guards are owned by each instance, so several stacks in one
/// process (typically tests) never interfere with each other.
pub struct Stack {
    providers: Vec<Registered>,
    lifecycle: Arc<Lifecycle>,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// A stack that traps SIGINT/SIGTERM.
    pub fn new() -> Self {
        StackBuilder::default().build()
    }

    pub fn builder() -> StackBuilder {
        StackBuilder::default()
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of the registered components, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(Registered::name).collect()
    }

    /// Token cancelled when shutdown begins, whatever triggered it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle.shutdown.clone()
    }

    /// Triggers shutdown as if an interrupt had been received.
    pub fn request_shutdown(&self) {
        info!("Shutdown requested");
        self.lifecycle.shutdown.cancel();
    }

    fn snapshot(&self) -> Arc<[Registered]> {
        self.providers.iter().cloned().collect()
    }

    // =========================================================================
    // INIT
    // =========================================================================

    /// Initializes a passive provider and appends it to the stack.
    ///
    /// On failure the provider is not registered.
    pub async fn init(&mut self, provider: Arc<dyn Provider>) -> Result<(), StackError> {
        self.register(Registered::Passive(provider)).await
    }

    /// Initializes a run provider and appends it to the stack. It will be
    /// launched by [`Stack::run`].
    pub async fn init_runnable(&mut self, provider: Arc<dyn RunProvider>) -> Result<(), StackError> {
        self.register(Registered::Runnable(provider)).await
    }

    /// [`Stack::init`], panicking on failure.
    pub async fn must_init(&mut self, provider: Arc<dyn Provider>) {
        if let Err(err) = self.init(provider).await {
            fatal(err);
        }
    }

    /// [`Stack::init_runnable`], panicking on failure.
    pub async fn must_init_runnable(&mut self, provider: Arc<dyn RunProvider>) {
        if let Err(err) = self.init_runnable(provider).await {
            fatal(err);
        }
    }

    async fn register(&mut self, entry: Registered) -> Result<(), StackError> {
        let component = entry.name().to_string();
        info!(component = %component, "Initializing provider");

        if let Err(e) = entry.init().await {
            error!(component = %component, error = %e, "Provider init failed");
            return Err(StackError::Init {
                component,
                source: Arc::new(e),
            });
        }

        self.providers.push(entry);
        info!(component = %component, position = self.providers.len(), "Provider initialized");
        Ok(())
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Launches every run provider and blocks until shutdown, then closes the
    /// stack.
    ///
    /// Executes at most once per stack: a concurrent or later caller waits for
    /// the first run to finish and gets the same outcome without launching
    /// anything. Returns [`StackError::Run`] as soon as any provider's `run`
    /// fails or panics; in that case the stack is not closed.
    pub async fn run(&self) -> Result<(), StackError> {
        self.lifecycle.run(self.snapshot()).await
    }

    /// [`Stack::run`], panicking on failure.
    pub async fn must_run(&self) {
        if let Err(err) = self.run().await {
            fatal(err);
        }
    }

    // =========================================================================
    // CLOSE
    // =========================================================================

    /// Closes every component in reverse registration order.
    ///
    /// Executes at most once per stack, whether called explicitly, from `run`
    /// after an interrupt, or both at the same time. Stops at the first
    /// failing `close`: components registered before it stay open.
    pub async fn close(&self) -> Result<(), StackError> {
        self.lifecycle.close(self.snapshot()).await
    }

    /// [`Stack::close`], panicking on failure.
    pub async fn must_close(&self) {
        if let Err(err) = self.close().await {
            fatal(err);
        }
    }
}

async fn launch_and_wait(
    lifecycle: Arc<Lifecycle>,
    providers: Arc<[Registered]>,
) -> Result<(), StackError> {
    let mut running = JoinSet::new();

    for provider in providers.iter().filter_map(Registered::as_runnable) {
        let provider = provider.clone();
        let component = provider.name().to_string();
        info!(component = %component, "Launching provider");

        running.spawn(async move {
            let outcome = match AssertUnwindSafe(provider.run()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(ProviderError::Panicked(panic_message(payload))),
            };
            match outcome {
                Ok(()) => {
                    info!(component = %component, "Provider run finished");
                    Ok(())
                }
                Err(e) => {
                    error!(component = %component, error = %e, "Provider run failed");
                    Err(StackError::Run {
                        component,
                        source: Arc::new(e),
                    })
                }
            }
        });
    }

    let outcome = loop {
        tokio::select! {
            received = wait_for_signal(lifecycle.trap_signals) => {
                if let Err(err) = received {
                    break Err(err);
                }
                lifecycle.shutdown.cancel();
                break Ok(());
            }
            _ = lifecycle.shutdown.cancelled() => {
                debug!("Shutdown token cancelled");
                break Ok(());
            }
            Some(joined) = running.join_next() => match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => break Err(err),
                Err(e) => break Err(StackError::Aborted(e.to_string())),
            },
        }
    };
    // Providers still inside `run` are stopped by their `close`, not aborted.
    running.detach_all();
    outcome?;

    lifecycle.close(providers).await
}

async fn wait_for_signal(trap_signals: bool) -> Result<(), StackError> {
    if !trap_signals {
        return std::future::pending().await;
    }
    signal::wait_for_shutdown_signal()
        .await
        .map(|_| ())
        .map_err(|e| StackError::Signal(e.to_string()))
}

async fn close_all(
    shutdown: CancellationToken,
    providers: Arc<[Registered]>,
) -> Result<(), StackError> {
    // Wakes up a pending `run` so it returns once closing is done.
    shutdown.cancel();
    info!(count = providers.len(), "Closing providers");

    for entry in providers.iter().rev() {
        let component = entry.name();
        debug!(component, "Closing provider");
        if let Err(e) = entry.close().await {
            error!(component, error = %e, "Provider close failed");
            return Err(StackError::Close {
                component: component.to_string(),
                source: Arc::new(e),
            });
        }
        info!(component, "Provider closed");
    }

    info!("Stack closed");
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn fatal(err: StackError) -> ! {
    error!(error = %err, "Fatal stack error");
    panic!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{entries, journal, MockProvider, MockRunProvider};
    use crate::wait::wait_for_running;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_stack() -> Stack {
        Stack::builder().with_trap_signals(false).build()
    }

    #[tokio::test]
    async fn init_registers_in_order() {
        let log = journal();
        let mut stack = test_stack();
        assert!(stack.is_empty());

        for name in ["a", "b", "c", "d"] {
            stack.must_init(Arc::new(MockProvider::new(name, &log))).await;
        }

        assert_eq!(stack.len(), 4);
        assert_eq!(stack.names(), ["a", "b", "c", "d"]);
        assert_eq!(entries(&log), ["init:a", "init:b", "init:c", "init:d"]);
    }

    #[tokio::test]
    async fn failed_init_is_not_registered() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockProvider::new("p1", &log));
        let p2 = Arc::new(MockProvider::new("p2", &log).failing_init());

        stack.must_init(p1.clone()).await;
        let err = stack.init(p2.clone()).await.unwrap_err();

        assert!(matches!(err, StackError::Init { .. }));
        assert_eq!(err.component(), Some("p2"));
        assert_eq!(stack.names(), ["p1"]);
        assert!(p1.is_initialized());
        assert!(!p2.is_initialized());
    }

    #[tokio::test]
    #[should_panic(expected = "failed to init p1")]
    async fn must_init_panics_on_failure() {
        let log = journal();
        let mut stack = test_stack();
        stack
            .must_init(Arc::new(MockProvider::new("p1", &log).failing_init()))
            .await;
    }

    #[tokio::test]
    async fn close_runs_in_reverse_order() {
        let log = journal();
        let mut stack = test_stack();
        for name in ["a", "b", "c"] {
            stack.must_init(Arc::new(MockProvider::new(name, &log))).await;
        }

        stack.must_close().await;

        assert_eq!(
            entries(&log),
            ["init:a", "init:b", "init:c", "close:c", "close:b", "close:a"]
        );
        // The list itself is left untouched.
        assert_eq!(stack.len(), 3);
    }

    #[tokio::test]
    async fn close_stops_at_first_failure() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockProvider::new("p1", &log));
        let p2 = Arc::new(MockRunProvider::new("p2", &log));
        let p3 = Arc::new(MockProvider::new("p3", &log).failing_close());
        stack.must_init(p1.clone()).await;
        stack.must_init_runnable(p2.clone()).await;
        stack.must_init(p3.clone()).await;

        let err = stack.close().await.unwrap_err();

        assert!(matches!(err, StackError::Close { .. }));
        assert_eq!(err.component(), Some("p3"));
        assert!(!p1.is_closed());
        assert!(!p2.is_closed());
        assert!(!p3.is_closed());
    }

    #[tokio::test]
    #[should_panic(expected = "failed to close p3")]
    async fn must_close_panics_on_failure() {
        let log = journal();
        let mut stack = test_stack();
        stack.must_init(Arc::new(MockProvider::new("p1", &log))).await;
        stack
            .must_init(Arc::new(MockProvider::new("p3", &log).failing_close()))
            .await;
        stack.must_close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let log = journal();
        let mut stack = test_stack();
        stack.must_init(Arc::new(MockProvider::new("a", &log))).await;
        stack.must_init(Arc::new(MockProvider::new("b", &log))).await;

        let stack = Arc::new(stack);
        let (first, second) = tokio::join!(stack.close(), stack.close());
        assert!(first.is_ok());
        assert!(second.is_ok());
        stack.must_close().await;

        assert_eq!(entries(&log), ["init:a", "init:b", "close:b", "close:a"]);
    }

    #[tokio::test]
    async fn close_failure_is_reported_to_every_caller() {
        let log = journal();
        let mut stack = test_stack();
        stack
            .must_init(Arc::new(MockProvider::new("a", &log).failing_close()))
            .await;

        assert!(stack.close().await.is_err());
        assert!(stack.close().await.is_err());
        assert_eq!(entries(&log), ["init:a", "close:a"]);
    }

    #[tokio::test]
    async fn run_launches_providers_until_shutdown() {
        let log = journal();
        let mut stack = test_stack();
        let p0 = Arc::new(MockProvider::new("p0", &log));
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        let p2 = Arc::new(MockRunProvider::new("p2", &log));
        stack.must_init(p0.clone()).await;
        stack.must_init_runnable(p1.clone()).await;
        stack.must_init_runnable(p2.clone()).await;
        assert!(!p1.is_running());
        assert!(!p2.is_running());

        let stack = Arc::new(stack);
        let runner = tokio::spawn({
            let stack = stack.clone();
            async move { stack.run().await }
        });

        wait_for_running(p1.as_ref(), Duration::from_secs(1)).await.unwrap();
        wait_for_running(p2.as_ref(), Duration::from_secs(1)).await.unwrap();

        stack.request_shutdown();
        runner.await.unwrap().unwrap();

        assert!(p0.is_closed());
        assert!(p1.is_closed() && !p1.is_running());
        assert!(p2.is_closed() && !p2.is_running());
        let log = entries(&log);
        assert_eq!(&log[log.len() - 3..], ["close:p2", "close:p1", "close:p0"]);
    }

    #[tokio::test]
    async fn explicit_close_ends_run() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        stack.must_init_runnable(p1.clone()).await;

        let stack = Arc::new(stack);
        let runner = tokio::spawn({
            let stack = stack.clone();
            async move { stack.run().await }
        });
        wait_for_running(p1.as_ref(), Duration::from_secs(1)).await.unwrap();

        stack.must_close().await;
        runner.await.unwrap().unwrap();

        let closes = entries(&log).iter().filter(|e| e.starts_with("close:")).count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        let p2 = Arc::new(MockRunProvider::new("p2", &log));
        stack.must_init_runnable(p1.clone()).await;
        stack.must_init_runnable(p2.clone()).await;

        let stack = Arc::new(stack);
        let first = tokio::spawn({
            let stack = stack.clone();
            async move { stack.run().await }
        });
        let second = tokio::spawn({
            let stack = stack.clone();
            async move { stack.run().await }
        });

        wait_for_running(p1.as_ref(), Duration::from_secs(1)).await.unwrap();
        wait_for_running(p2.as_ref(), Duration::from_secs(1)).await.unwrap();
        stack.request_shutdown();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(p1.run_calls(), 1);
        assert_eq!(p2.run_calls(), 1);
    }

    #[tokio::test]
    async fn no_second_run_or_close_after_shutdown() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        stack.must_init_runnable(p1.clone()).await;
        stack.request_shutdown();
        stack.must_run().await;
        assert!(p1.is_closed());

        // Registered after the stack already ran and closed.
        let p2 = Arc::new(MockRunProvider::new("p2", &log));
        stack.must_init_runnable(p2.clone()).await;
        stack.must_run().await;
        stack.must_close().await;

        assert_eq!(p2.run_calls(), 0);
        assert!(!p2.is_closed());
    }

    #[tokio::test]
    async fn run_failure_is_returned_to_the_caller() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        let p2 = Arc::new(MockRunProvider::new("p2", &log).failing_run());
        stack.must_init_runnable(p1.clone()).await;
        stack.must_init_runnable(p2.clone()).await;

        let err = tokio::time::timeout(Duration::from_secs(2), stack.run())
            .await
            .expect("run should return on provider failure")
            .unwrap_err();

        assert!(matches!(err, StackError::Run { .. }));
        assert_eq!(err.component(), Some("p2"));
        assert!(!p1.is_closed());
    }

    #[tokio::test]
    #[should_panic(expected = "failed to run p1")]
    async fn must_run_panics_on_provider_failure() {
        let log = journal();
        let mut stack = test_stack();
        stack
            .must_init_runnable(Arc::new(MockRunProvider::new("p1", &log).failing_run()))
            .await;
        stack.must_run().await;
    }

    #[tokio::test]
    async fn cancelled_run_caller_does_not_relaunch() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        stack.must_init_runnable(p1.clone()).await;

        assert!(timeout(Duration::from_millis(50), stack.run()).await.is_err());
        assert!(timeout(Duration::from_millis(50), stack.run()).await.is_err());
        assert_eq!(p1.run_calls(), 1);
        assert!(p1.is_running(), "run keeps going after its caller gave up");

        stack.request_shutdown();
        stack.must_run().await;
        assert_eq!(p1.run_calls(), 1);
        assert!(p1.is_closed());
    }

    #[tokio::test]
    async fn cancelled_close_caller_does_not_close_twice() {
        let log = journal();
        let mut stack = test_stack();
        stack.must_init(Arc::new(MockProvider::new("a", &log))).await;
        stack.must_init(Arc::new(MockProvider::new("b", &log))).await;
        stack
            .must_init(Arc::new(
                MockProvider::new("c", &log).with_close_delay(Duration::from_millis(100)),
            ))
            .await;

        assert!(timeout(Duration::from_millis(20), stack.close()).await.is_err());
        stack.must_close().await;

        assert_eq!(
            entries(&log),
            ["init:a", "init:b", "init:c", "close:c", "close:b", "close:a"]
        );
    }

    struct Crashing;

    #[async_trait::async_trait]
    impl Provider for Crashing {}

    #[async_trait::async_trait]
    impl RunProvider for Crashing {
        async fn run(&self) -> Result<(), ProviderError> {
            panic!("serving loop crashed");
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn run_panic_is_reported_as_run_failure() {
        let log = journal();
        let mut stack = test_stack();
        let p1 = Arc::new(MockRunProvider::new("p1", &log));
        stack.must_init_runnable(p1.clone()).await;
        stack.must_init_runnable(Arc::new(Crashing)).await;

        let err = timeout(Duration::from_millis(500), stack.run())
            .await
            .expect("run should return when a provider panics")
            .unwrap_err();

        assert_eq!(err.component(), Some("Crashing"));
        match err {
            StackError::Run { source, .. } => match source.as_ref() {
                ProviderError::Panicked(message) => assert_eq!(message, "serving loop crashed"),
                other => panic!("unexpected source: {other:?}"),
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!p1.is_closed());
    }

    #[tokio::test]
    async fn independent_stacks_do_not_share_guards() {
        let log = journal();
        let mut first = test_stack();
        let mut second = test_stack();
        first.must_init(Arc::new(MockProvider::new("a", &log))).await;
        second.must_init(Arc::new(MockProvider::new("b", &log))).await;

        first.must_close().await;
        second.must_close().await;

        assert_eq!(entries(&log), ["init:a", "init:b", "close:a", "close:b"]);
    }
}
