use std::sync::Arc;

use axum::{middleware::from_fn_with_state, Router};

use super::handler::forward;
use super::service::ProxyService;
use crate::features::rate_limits::middleware::admission_middleware;
use crate::features::rate_limits::RateLimitEngine;

/// Catch-all proxy router. Every request reaching it goes through admission first.
pub fn routes(proxy: Arc<ProxyService>, engine: Arc<RateLimitEngine>) -> Router {
    Router::new()
        .fallback(forward)
        .with_state(proxy)
        .layer(from_fn_with_state(engine, admission_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{RateLimitSettings, UpstreamConfig};
    use crate::features::rate_limits::store::{ConfigStore, InMemoryConfigStore};
    use crate::shared::test_helpers::sample_config;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum::routing::get;
    use axum_test::TestServer;
    use std::time::Duration;

    const CLIENT_HEADER: HeaderName = HeaderName::from_static("x-client-id");

    async fn spawn_upstream() -> String {
        let upstream = Router::new().route(
            "/api/orders",
            get(|uri: axum::http::Uri| async move { format!("upstream saw {}", uri) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn gateway(upstream: Option<String>, rpm: i64) -> TestServer {
        let store = Arc::new(InMemoryConfigStore::new());
        store
            .save(sample_config("client-a", "/api/orders", rpm, 0))
            .await
            .unwrap();
        let engine = Arc::new(RateLimitEngine::new(store, RateLimitSettings::default()));
        let proxy = ProxyService::new(
            &UpstreamConfig {
                url: upstream,
                timeout: Duration::from_secs(5),
            },
            1024 * 1024,
        )
        .unwrap();

        let app = Router::new().fallback_service(routes(Arc::new(proxy), engine));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_upstream() {
        let upstream = spawn_upstream().await;
        let server = gateway(Some(upstream), 1).await;

        let response = server
            .get("/api/orders?page=2")
            .add_header(CLIENT_HEADER, HeaderValue::from_static("client-a"))
            .await;
        response.assert_status_ok();
        response.assert_text("upstream saw /api/orders?page=2");

        server
            .get("/api/orders")
            .add_header(CLIENT_HEADER, HeaderValue::from_static("client-a"))
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_missing_upstream_is_bad_gateway() {
        let server = gateway(None, 5).await;

        server
            .get("/api/orders")
            .add_header(CLIENT_HEADER, HeaderValue::from_static("client-a"))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_gateway_requires_client_header() {
        let server = gateway(None, 5).await;

        server
            .get("/api/orders")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
