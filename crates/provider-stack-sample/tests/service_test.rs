use provider_stack::{
    wait_for_running, App, AppConfig, EnvMsDuration, Probes, ProbesConfig, RunProvider, Stack,
};
use provider_stack_sample::{Pinger, PingerConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn service_becomes_ready_and_shuts_down() {
    let mut stack = Stack::builder().with_trap_signals(false).build();

    let app = Arc::new(App::new(AppConfig {
        name: Some("sample".to_string()),
        base_path: "/sample".to_string(),
        version: Some("0.0.0".to_string()),
    }));
    stack.must_init(app.clone()).await;

    let probes = Arc::new(
        Probes::new(ProbesConfig {
            port: 0,
            shutdown_timeout: EnvMsDuration(Duration::from_secs(1)),
            ..ProbesConfig::default()
        })
        .with_app(app),
    );
    stack.must_init_runnable(probes.clone()).await;

    let pinger = Arc::new(Pinger::new(
        PingerConfig {
            interval: EnvMsDuration(Duration::from_millis(20)),
            wait_timeout: EnvMsDuration(Duration::from_secs(2)),
        },
        probes.clone(),
    ));
    stack.must_init_runnable(pinger.clone()).await;

    let stack = Arc::new(stack);
    let runner = tokio::spawn({
        let stack = stack.clone();
        async move { stack.run().await }
    });

    wait_for_running(pinger.as_ref(), Duration::from_secs(2))
        .await
        .unwrap();
    let port = probes.local_addr().expect("probes should be bound").port();
    let client = reqwest::Client::new();

    // The first tick fires immediately, but give it a few rounds.
    let mut ready = None;
    for _ in 0..50 {
        let response = client
            .get(format!("http://127.0.0.1:{port}/sample/ready"))
            .send()
            .await
            .unwrap();
        if response.status() == reqwest::StatusCode::OK {
            ready = Some(response);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready.is_some(), "service never became ready");

    let live = client
        .get(format!("http://127.0.0.1:{port}/sample/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), reqwest::StatusCode::OK);

    stack.request_shutdown();
    runner.await.unwrap().unwrap();

    assert!(!pinger.is_running());
    assert!(!probes.is_running());
    assert!(pinger.ticks() > 0);
}
