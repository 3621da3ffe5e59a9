//! # App Provider
//!
//! Holds the application identity (name, version) and the base path under
//! which every HTTP endpoint of the application is mounted.

use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::provider::Provider;
use async_trait::async_trait;
use tracing::info;

const UNKNOWN_VERSION: &str = "unknown";

pub struct App {
    name: String,
    version: String,
    base_path: String,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let name = config.name.unwrap_or_else(executable_name);
        let version = config
            .version
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        Self {
            name,
            version,
            base_path: clean_path(&config.base_path),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Cleaned base path, always starting with `/`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Joins `endpoint` onto the base path and cleans the result.
    ///
    /// `/svc` + `healthz` and `/svc/` + `/healthz` both give `/svc/healthz`.
    pub fn parse_endpoint(&self, endpoint: &str) -> String {
        clean_path(&format!("{}/{}", self.base_path, endpoint))
    }
}

#[async_trait]
impl Provider for App {
    async fn init(&self) -> Result<(), ProviderError> {
        info!(
            app = %self.name,
            version = %self.version,
            base_path = %self.base_path,
            "App provider initialized"
        );
        Ok(())
    }
}

/// Lexically cleans a URL path: collapses repeated slashes, drops `.`
/// segments, resolves `..` and strips any trailing slash. The result is
/// always absolute.
pub(crate) fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn executable_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(base_path: &str) -> App {
        App::new(AppConfig {
            name: Some("billing".to_string()),
            base_path: base_path.to_string(),
            version: Some("1.2.3".to_string()),
        })
    }

    #[test]
    fn clean_path_normalizes() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("healthz"), "/healthz");
        assert_eq!(clean_path("//a///b/"), "/a/b");
        assert_eq!(clean_path("/a/./b/../c"), "/a/c");
        assert_eq!(clean_path("/../a"), "/a");
    }

    #[test]
    fn parse_endpoint_with_root_base() {
        let app = app("/");
        assert_eq!(app.parse_endpoint("/healthz"), "/healthz");
        assert_eq!(app.parse_endpoint("ready"), "/ready");
    }

    #[test]
    fn parse_endpoint_with_prefix() {
        let app = app("svc/");
        assert_eq!(app.base_path(), "/svc");
        assert_eq!(app.parse_endpoint("/healthz"), "/svc/healthz");
        assert_eq!(app.parse_endpoint("ready/"), "/svc/ready");
    }

    #[test]
    fn identity_from_config() {
        let app = app("/");
        assert_eq!(app.app_name(), "billing");
        assert_eq!(app.version(), "1.2.3");
        assert_eq!(app.name(), "App");
    }

    #[test]
    fn identity_defaults() {
        let app = App::new(AppConfig::default());
        assert!(!app.app_name().is_empty());
        assert_eq!(app.version(), UNKNOWN_VERSION);
    }

    #[tokio::test]
    async fn init_and_close_succeed() {
        let app = app("/");
        app.init().await.unwrap();
        app.close().await.unwrap();
    }
}
