//! # Probe Aggregator
//!
//! A [`RunProvider`] that serves two HTTP endpoints for an external
//! orchestrator: liveness ("keep me running?") and readiness ("route traffic
//! to me?"). Other components contribute checks during their own `init`:
//!
//! ```rust,ignore
//! let probes = Arc::new(Probes::new(ProbesConfig::from_env()?).with_app(app.clone()));
//! stack.must_init_runnable(probes.clone()).await;
//!
//! let pool = db.clone();
//! probes.add_readiness_probe(move || {
//!     let pool = pool.clone();
//!     async move { pool.ping().await.map_err(|e| ProviderError::Other(e.into())) }
//! });
//! ```
//!
//! ## Evaluation
//! Probes run in registration order. The first failure answers
//! `503 Service Unavailable` with the error text as body and the remaining
//! probes are skipped. When every probe passes (or none is registered) the
//! answer is `200 OK` with an empty body.
//!
//! Probes can be added at any time; each request evaluates a snapshot of the
//! list taken when the request arrives.

use crate::app::{clean_path, App};
use crate::config::ProbesConfig;
use crate::error::ProviderError;
use crate::provider::{Provider, RunProvider, RunningFlag};
use async_trait::async_trait;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, RwLock};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of a single probe.
pub type ProbeResult = Result<(), ProviderError>;

type Probe = Arc<dyn Fn() -> BoxFuture<'static, ProbeResult> + Send + Sync>;

// =============================================================================
// PROBE SET
// =============================================================================

/// Ordered, append-only list of probes shared with the HTTP handlers.
#[derive(Clone, Default)]
struct ProbeSet(Arc<RwLock<Vec<Probe>>>);

impl ProbeSet {
    fn push(&self, probe: Probe) {
        self.0.write().unwrap_or_else(|e| e.into_inner()).push(probe);
    }

    fn snapshot(&self) -> Vec<Probe> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn len(&self) -> usize {
        self.0.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Runs the probes in order and stops at the first failure.
    async fn check(&self) -> ProbeResult {
        for probe in self.snapshot() {
            probe().await?;
        }
        Ok(())
    }
}

fn boxed<F, Fut>(probe: F) -> Probe
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult> + Send + 'static,
{
    Arc::new(move || probe().boxed())
}

async fn answer(kind: &'static str, probes: ProbeSet, method: Method, uri: Uri) -> Response {
    debug!(probe = kind, %method, %uri, "Probe request");
    match probes.check().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(probe = kind, error = %e, "Probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

pub struct Probes {
    config: ProbesConfig,
    app: Option<Arc<App>>,
    liveness: ProbeSet,
    readiness: ProbeSet,
    running: RunningFlag,
    local_addr: OnceLock<SocketAddr>,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl Probes {
    pub fn new(config: ProbesConfig) -> Self {
        Self {
            config,
            app: None,
            liveness: ProbeSet::default(),
            readiness: ProbeSet::default(),
            running: RunningFlag::new(),
            local_addr: OnceLock::new(),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    /// Mounts both endpoints under the application's base path.
    pub fn with_app(mut self, app: Arc<App>) -> Self {
        self.app = Some(app);
        self
    }

    pub fn add_liveness_probe<F, Fut>(&self, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        self.liveness.push(boxed(probe));
    }

    pub fn add_readiness_probe<F, Fut>(&self, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        self.readiness.push(boxed(probe));
    }

    pub fn liveness_endpoint(&self) -> String {
        self.endpoint(&self.config.liveness_endpoint)
    }

    pub fn readiness_endpoint(&self) -> String {
        self.endpoint(&self.config.readiness_endpoint)
    }

    /// Address the HTTP service is bound to, once `run` has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// The liveness and readiness routes, without a listener.
    pub fn router(&self) -> Router {
        let liveness = self.liveness.clone();
        let readiness = self.readiness.clone();
        Router::new()
            .route(
                &self.liveness_endpoint(),
                any(move |method: Method, uri: Uri| answer("liveness", liveness, method, uri)),
            )
            .route(
                &self.readiness_endpoint(),
                any(move |method: Method, uri: Uri| answer("readiness", readiness, method, uri)),
            )
    }

    fn endpoint(&self, raw: &str) -> String {
        match &self.app {
            Some(app) => app.parse_endpoint(raw),
            None => clean_path(raw),
        }
    }
}

#[async_trait]
impl Provider for Probes {
    async fn init(&self) -> Result<(), ProviderError> {
        info!(
            enabled = self.config.enabled,
            port = self.config.port,
            liveness_endpoint = %self.liveness_endpoint(),
            readiness_endpoint = %self.readiness_endpoint(),
            "Probes provider initialized"
        );
        Ok(())
    }

    /// Stops the HTTP service, waiting at most `shutdown_timeout` for
    /// in-flight requests. Teardown problems are logged, never returned.
    async fn close(&self) -> Result<(), ProviderError> {
        self.shutdown.cancel();
        if self.local_addr.get().is_some() {
            let timeout = self.config.shutdown_timeout.0;
            if tokio::time::timeout(timeout, self.stopped.cancelled())
                .await
                .is_err()
            {
                error!(?timeout, "Probes server did not stop in time");
            }
        }
        self.running.set_running(false);
        info!(
            liveness_probes = self.liveness.len(),
            readiness_probes = self.readiness.len(),
            "Probes provider closed"
        );
        Ok(())
    }
}

#[async_trait]
impl RunProvider for Probes {
    async fn run(&self) -> Result<(), ProviderError> {
        if !self.config.enabled {
            info!("Probes provider disabled");
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            info!("Probes provider already closed");
            return Ok(());
        }

        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.config.port))).await?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        let router = self.router();
        let shutdown = self.shutdown.clone();

        info!(%local_addr, "Probes server listening");
        self.running.set_running(true);
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        self.running.set_running(false);
        self.stopped.cancel();

        if let Err(e) = served {
            error!(error = %e, "Probes server failed");
            return Err(e.into());
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.is_running()
    }
}
