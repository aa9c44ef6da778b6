//! HTTP handlers: metrics exposition, liveness, and access logging.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::Registry;
use tower_http::compression::CompressionLayer;
use tracing::{error, info, warn};

use dirsize_core::metrics::{TEXT_CONTENT_TYPE, encode_text};

pub const LIVENESS_BODY: &str = "Prometheus Directory Size Exporter is up and running";

/// Builds the router: `metrics_path` serves the registry, everything else
/// answers the liveness probe.
pub(crate) fn router(metrics_path: &str, registry: Registry) -> Router {
    Router::new()
        .route(metrics_path, get(handle_metrics))
        .fallback(handle_liveness)
        .with_state(registry)
        .layer(middleware::from_fn(access_log))
        .layer(CompressionLayer::new())
}

// ============================================================
// Metrics
// ============================================================

async fn handle_metrics(State(registry): State<Registry>) -> Response {
    // Gathering blocks until every directory is measured.
    let encoded = tokio::task::spawn_blocking(move || encode_text(&registry)).await;

    match encoded {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
        Err(e) => {
            error!(error = %e, "metrics collection panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics collection failed").into_response()
        }
    }
}

// ============================================================
// Liveness
// ============================================================

async fn handle_liveness() -> &'static str {
    LIVENESS_BODY
}

// ============================================================
// Access log
// ============================================================

/// Logs one line per request. Failed scrapes are logged at `warn`.
pub(crate) async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_owned());
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(client = %client, status, latency_ms, "{method} {path}");
    } else {
        info!(client = %client, status, latency_ms, "{method} {path}");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use dirsize_core::DirectoryCollector;
    use dirsize_core::collector::MockDiskUsage;
    use dirsize_core::metrics::new_registry;
    use tower::ServiceExt;

    fn registry_with(usage: MockDiskUsage, dirs: &[&str]) -> Registry {
        let registry = new_registry().unwrap();
        let collector = DirectoryCollector::new(dirs.iter().copied(), usage).unwrap();
        registry.register(Box::new(collector)).unwrap();
        registry
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_liveness_on_root() {
        let app = router("/metrics", new_registry().unwrap());
        let (status, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LIVENESS_BODY);
    }

    #[tokio::test]
    async fn test_liveness_on_unmatched_path() {
        let app = router("/metrics", new_registry().unwrap());
        let (status, body) = get_body(app, "/healthz/anything").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LIVENESS_BODY);
    }

    #[tokio::test]
    async fn test_metrics_route_serves_directory_series() {
        let usage = MockDiskUsage::new();
        usage.set_size("/data/example_directory", 2_105_344);
        let app = router("/metrics", registry_with(usage, &["/data/example_directory"]));

        let response = app
            .oneshot(HttpRequest::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            TEXT_CONTENT_TYPE
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains(
            r#"directory_size_bytes{name="example_directory",path="/data/example_directory"} 2105344"#
        ));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let usage = MockDiskUsage::new();
        usage.set_size("/var/log", 4096);
        let app = router("/custom-metrics-path", registry_with(usage, &["/var/log"]));

        let (status, body) = get_body(app.clone(), "/custom-metrics-path").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"directory_size_bytes{name="log",path="/var/log"} 4096"#));

        // The default path is just another unmatched path now.
        let (status, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LIVENESS_BODY);
    }

    #[tokio::test]
    async fn test_metrics_scrape_measures_each_time() {
        let usage = MockDiskUsage::new();
        usage.set_size("/srv/data", 1);
        let app = router("/metrics", registry_with(usage.clone(), &["/srv/data"]));

        get_body(app.clone(), "/metrics").await;
        usage.set_size("/srv/data", 2);
        let (_, body) = get_body(app, "/metrics").await;

        assert_eq!(usage.measure_calls(), 2);
        assert!(body.contains(r#"directory_size_bytes{name="data",path="/srv/data"} 2"#));
    }
}
