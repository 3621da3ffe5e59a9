//! # Tracing Provider
//!
//! Installs the global `tracing` subscriber as the first component of a
//! stack, so that every later `init` is logged.
//!
//! ## Filtering
//! `RUST_LOG` wins when it is set. Otherwise the `LOG_LEVEL` directive from
//! [`TracingConfig`] is used, which accepts anything `EnvFilter` does:
//!
//! ```bash
//! LOG_LEVEL=debug cargo run -p provider-stack-sample
//! LOG_LEVEL="info,provider_stack=debug" cargo run -p provider-stack-sample
//! ```
//!
//! ## Output Formats
//! - `compact`: one line per event, spans inline, no module paths.
//! - `full`: the default fmt layout with targets.
//!
//! A process has a single global subscriber. Initializing a second
//! `Tracing` provider fails instead of silently replacing the first.

use crate::config::{LogFormat, TracingConfig};
use crate::error::ProviderError;
use crate::provider::Provider;
use async_trait::async_trait;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub struct Tracing {
    config: TracingConfig,
}

impl Tracing {
    pub fn new(config: TracingConfig) -> Self {
        Self { config }
    }

    fn filter(&self) -> Result<EnvFilter, ProviderError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.config.level).map_err(|e| {
            ProviderError::custom(format!("invalid log level {:?}: {e}", self.config.level))
        })
    }
}

#[async_trait]
impl Provider for Tracing {
    async fn init(&self) -> Result<(), ProviderError> {
        let filter = self.filter()?;
        let installed = match self.config.format {
            LogFormat::Compact => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .compact()
                .try_init(),
            LogFormat::Full => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        };
        installed.map_err(ProviderError::Other)?;

        debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "Tracing provider initialized"
        );
        Ok(())
    }
}
