use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dirsize_exporter::{
    LIVENESS_BODY, MetricsServer, ServeConfig, ServerConfig, ServerError, ServerState, Strategy,
    build_registry,
};
use tokio::task::JoinHandle;

fn serve_config(directories: Vec<PathBuf>, metrics_path: &str) -> ServeConfig {
    ServeConfig {
        directories,
        measure_timeout: Duration::from_secs(10),
        strategy: Strategy::Walk,
        server: ServerConfig {
            port: 0,
            metrics_path: metrics_path.to_string(),
            ..ServerConfig::default()
        },
    }
}

/// Starts the server on a free port and waits until it is listening.
/// Returns the base URL to reach it through the loopback interface.
async fn spawn_server(
    config: ServeConfig,
) -> (Arc<MetricsServer>, JoinHandle<Result<(), ServerError>>, String) {
    let registry = build_registry(&config).unwrap();
    let server = Arc::new(MetricsServer::new(config.server, registry).unwrap());

    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.start().await });

    for _ in 0..200 {
        if let Some(addr) = server.local_addr() {
            let base = format!("http://localhost:{}", addr.port());
            return (server, handle, base);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not start listening");
}

async fn stop(server: &MetricsServer, handle: JoinHandle<Result<(), ServerError>>) {
    server.stop();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("server did not stop in time")
        .unwrap();
    assert!(result.is_ok(), "start returned {result:?}");
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_liveness_on_root() {
    let (server, handle, base) = spawn_server(serve_config(Vec::new(), "/metrics")).await;
    assert_eq!(server.state(), ServerState::Listening);

    let response = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), LIVENESS_BODY);

    stop(&server, handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_endpoint_serves_directory_and_process_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("example_directory");
    std::fs::create_dir(&data).unwrap();
    std::fs::write(data.join("payload.bin"), vec![3u8; 128 * 1024]).unwrap();

    let (server, handle, base) =
        spawn_server(serve_config(vec![data.clone()], "/metrics")).await;

    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();

    let prefix = format!(
        r#"directory_size_bytes{{name="example_directory",path="{}"}} "#,
        data.display()
    );
    let line = body
        .lines()
        .find(|l| l.starts_with(&prefix))
        .unwrap_or_else(|| panic!("missing directory series in:\n{body}"));
    let bytes: f64 = line[prefix.len()..].parse().unwrap();
    assert!(bytes > 0.0);

    #[cfg(target_os = "linux")]
    assert!(body.contains("process_cpu_seconds_total"));

    stop(&server, handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_metrics_path() {
    let (server, handle, base) =
        spawn_server(serve_config(Vec::new(), "/custom-metrics-path")).await;

    let response = reqwest::get(format!("{base}/custom-metrics-path"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.starts_with('#') || body.is_empty());

    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.text().await.unwrap(), LIVENESS_BODY);

    stop(&server, handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_directory_is_not_exposed() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("some-non-existing-dir");

    let (server, handle, base) = spawn_server(serve_config(vec![missing], "/metrics")).await;

    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(!body.contains("directory_size_bytes{"));

    stop(&server, handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bind_failure_is_reported() {
    // Held on the same wildcard the server tries first.
    let occupied = TcpListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
        .or_else(|_| TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))))
        .unwrap();
    let port = occupied.local_addr().unwrap().port();

    let config = ServerConfig {
        port,
        ..ServerConfig::default()
    };
    let server = MetricsServer::new(config, build_registry(&serve_config(Vec::new(), "")).unwrap())
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server.start())
        .await
        .expect("start should fail immediately");
    match result {
        Err(ServerError::Bind { addr, .. }) => assert_eq!(addr.port(), port),
        other => panic!("expected bind error, got {other:?}"),
    }
    assert_eq!(server.state(), ServerState::FailedToStart);
    assert_eq!(server.local_addr(), None);

    // Stop after a failed start is a no-op.
    server.stop();
    assert_eq!(server.state(), ServerState::FailedToStart);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_twice_is_rejected() {
    let (server, handle, _base) = spawn_server(serve_config(Vec::new(), "/metrics")).await;

    let second = server.start().await;
    assert!(matches!(
        second,
        Err(ServerError::AlreadyStarted(ServerState::Listening))
    ));

    stop(&server, handle).await;
    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
}
