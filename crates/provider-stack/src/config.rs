//! # Configuration
//!
//! Environment-driven configuration for the providers shipped with this
//! crate. The stack itself never reads configuration: the embedding
//! application loads these structs and hands fully-formed providers to the
//! [`Stack`](crate::Stack).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PROBES_ENABLED` | `true` |
//! | `PROBES_PORT` | `8000` |
//! | `PROBES_LIVENESS_ENDPOINT` | `/healthz` |
//! | `PROBES_READINESS_ENDPOINT` | `/ready` |
//! | `PROBES_SHUTDOWN_TIMEOUT_MS` | `5000` |
//! | `APP_NAME` | executable name |
//! | `APP_BASE_PATH` | `/` |
//! | `APP_VERSION` | unset |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FORMAT` | `compact` (`compact` or `full`) |

use envconfig::Envconfig;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub use envconfig::Error as ConfigError;

/// A duration read from the environment as a number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

// =============================================================================
// PROBES
// =============================================================================

/// Configuration for the [`Probes`](crate::Probes) provider.
#[derive(Envconfig, Debug, Clone)]
pub struct ProbesConfig {
    /// Whether the HTTP service should run at all.
    #[envconfig(from = "PROBES_ENABLED", default = "true")]
    pub enabled: bool,

    /// Port of the HTTP service. `0` picks a free port.
    #[envconfig(from = "PROBES_PORT", default = "8000")]
    pub port: u16,

    #[envconfig(from = "PROBES_LIVENESS_ENDPOINT", default = "/healthz")]
    pub liveness_endpoint: String,

    #[envconfig(from = "PROBES_READINESS_ENDPOINT", default = "/ready")]
    pub readiness_endpoint: String,

    /// Upper bound on the graceful shutdown of the HTTP service.
    #[envconfig(from = "PROBES_SHUTDOWN_TIMEOUT_MS", default = "5000")]
    pub shutdown_timeout: EnvMsDuration,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            liveness_endpoint: "/healthz".to_string(),
            readiness_endpoint: "/ready".to_string(),
            shutdown_timeout: EnvMsDuration(Duration::from_millis(5000)),
        }
    }
}

impl ProbesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        debug!(
            enabled = config.enabled,
            port = config.port,
            liveness_endpoint = %config.liveness_endpoint,
            readiness_endpoint = %config.readiness_endpoint,
            shutdown_timeout = ?config.shutdown_timeout.0,
            "Probes config initialized"
        );
        Ok(config)
    }
}

// =============================================================================
// APP
// =============================================================================

/// Configuration for the [`App`](crate::App) provider.
#[derive(Envconfig, Debug, Clone)]
pub struct AppConfig {
    /// Application name; the executable name when unset.
    #[envconfig(from = "APP_NAME")]
    pub name: Option<String>,

    /// Prefix applied to every endpoint the application exposes.
    #[envconfig(from = "APP_BASE_PATH", default = "/")]
    pub base_path: String,

    #[envconfig(from = "APP_VERSION")]
    pub version: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: None,
            base_path: "/".to_string(),
            version: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        debug!(
            name = ?config.name,
            base_path = %config.base_path,
            version = ?config.version,
            "App config initialized"
        );
        Ok(config)
    }
}

// =============================================================================
// TRACING
// =============================================================================

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown log format: {0}")]
pub struct ParseLogFormatError(pub String);

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            other => Err(ParseLogFormatError(other.to_string())),
        }
    }
}

/// Configuration for the [`Tracing`](crate::Tracing) provider.
#[derive(Envconfig, Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive; `RUST_LOG` takes precedence when set.
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub level: String,

    #[envconfig(from = "LOG_FORMAT", default = "compact")]
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl TracingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        // Usually loaded before any subscriber exists; logged for callers that already have one.
        debug!(level = %config.level, format = ?config.format, "Tracing config initialized");
        Ok(config)
    }
}
