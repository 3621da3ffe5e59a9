//! # Pinger
//!
//! A run provider that ticks on a fixed interval once the probes server is
//! up. It contributes two probes:
//!
//! - readiness: fails until the first tick happened,
//! - liveness: fails when the last tick is older than three intervals.

use async_trait::async_trait;
use envconfig::Envconfig;
use provider_stack::{
    wait_for_running, ConfigError, EnvMsDuration, Probes, Provider, ProviderError, RunProvider,
    RunningFlag,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Missed intervals after which the pinger is reported as stalled.
const STALL_FACTOR: u32 = 3;

#[derive(Envconfig, Debug, Clone)]
pub struct PingerConfig {
    #[envconfig(from = "PINGER_INTERVAL_MS", default = "1000")]
    pub interval: EnvMsDuration,

    /// How long `run` waits for the probes server before giving up.
    #[envconfig(from = "PINGER_WAIT_TIMEOUT_MS", default = "2000")]
    pub wait_timeout: EnvMsDuration,
}

impl PingerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        debug!(
            interval = ?config.interval.0,
            wait_timeout = ?config.wait_timeout.0,
            "Pinger config initialized"
        );
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PingerError {
    #[error("pinger has not ticked yet")]
    NotStarted,
    #[error("pinger stalled: last tick {0:?} ago")]
    Stalled(Duration),
}

impl From<PingerError> for ProviderError {
    fn from(e: PingerError) -> Self {
        ProviderError::Other(Box::new(e))
    }
}

#[derive(Default)]
struct Ticks {
    count: AtomicU64,
    last: Mutex<Option<Instant>>,
}

impl Ticks {
    fn tick(&self) -> u64 {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn since_last(&self) -> Option<Duration> {
        self.last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|at| at.elapsed())
    }

    fn ready(&self) -> Result<(), PingerError> {
        match self.since_last() {
            Some(_) => Ok(()),
            None => Err(PingerError::NotStarted),
        }
    }

    fn alive(&self, interval: Duration) -> Result<(), PingerError> {
        match self.since_last() {
            Some(elapsed) if elapsed > interval * STALL_FACTOR => Err(PingerError::Stalled(elapsed)),
            _ => Ok(()),
        }
    }
}

pub struct Pinger {
    config: PingerConfig,
    probes: Arc<Probes>,
    ticks: Arc<Ticks>,
    running: RunningFlag,
    stop: CancellationToken,
}

impl Pinger {
    pub fn new(config: PingerConfig, probes: Arc<Probes>) -> Self {
        Self {
            config,
            probes,
            ticks: Arc::new(Ticks::default()),
            running: RunningFlag::new(),
            stop: CancellationToken::new(),
        }
    }

    /// Number of ticks since `run` started.
    pub fn ticks(&self) -> u64 {
        self.ticks.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for Pinger {
    async fn init(&self) -> Result<(), ProviderError> {
        let ticks = self.ticks.clone();
        self.probes
            .add_readiness_probe(move || std::future::ready(ticks.ready().map_err(Into::into)));

        let ticks = self.ticks.clone();
        let interval = self.config.interval.0;
        self.probes.add_liveness_probe(move || {
            std::future::ready(ticks.alive(interval).map_err(Into::into))
        });

        info!(interval = ?interval, "Pinger provider initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.stop.cancel();
        self.running.set_running(false);
        info!(ticks = self.ticks(), "Pinger provider closed");
        Ok(())
    }
}

#[async_trait]
impl RunProvider for Pinger {
    async fn run(&self) -> Result<(), ProviderError> {
        wait_for_running(self.probes.as_ref(), self.config.wait_timeout.0).await?;

        let mut interval = tokio::time::interval(self.config.interval.0);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.running.set_running(true);
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = interval.tick() => {
                    let count = self.ticks.tick();
                    debug!(count, "Ping");
                }
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.is_running()
    }
}
