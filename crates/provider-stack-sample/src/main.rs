use provider_stack::{App, AppConfig, Probes, ProbesConfig, Stack, Tracing, TracingConfig};
use provider_stack_sample::{Pinger, PingerConfig};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), provider_stack::ConfigError> {
    let mut stack = Stack::new();

    // Tracing first, so every later init is logged
    stack
        .must_init(Arc::new(Tracing::new(TracingConfig::from_env()?)))
        .await;

    let mut app_config = AppConfig::from_env()?;
    app_config
        .version
        .get_or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());
    let app = Arc::new(App::new(app_config));
    stack.must_init(app.clone()).await;

    let probes = Arc::new(Probes::new(ProbesConfig::from_env()?).with_app(app.clone()));
    stack.must_init_runnable(probes.clone()).await;

    let pinger = Arc::new(Pinger::new(PingerConfig::from_env()?, probes));
    stack.must_init_runnable(pinger).await;

    info!(app = app.app_name(), version = app.version(), "Starting");
    stack.must_run().await;
    info!("Shutdown complete");
    Ok(())
}
