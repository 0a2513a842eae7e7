use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderMap, HeaderName},
    response::Response,
};

use crate::core::config::UpstreamConfig;
use crate::core::error::{AppError, Result};

/// Connection-scoped headers that must not cross the proxy
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Relays admitted requests to a single upstream base URL
pub struct ProxyService {
    client: reqwest::Client,
    upstream: Option<String>,
    max_body_size: usize,
}

impl ProxyService {
    pub fn new(config: &UpstreamConfig, max_body_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upstream: config.url.clone(),
            max_body_size,
        })
    }

    /// Sends the request upstream with its method, path, query, headers and
    /// body unchanged, and relays the upstream response.
    pub async fn forward(&self, req: Request) -> Result<Response> {
        let upstream = self
            .upstream
            .as_deref()
            .ok_or_else(|| AppError::ExternalServiceError("No upstream configured".to_string()))?;

        let (parts, body) = req.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", upstream, path);

        let body = to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        tracing::debug!("Forwarding {} {}", parts.method, url);

        let upstream_response = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Upstream request failed: {}", e))
            })?;

        let status = upstream_response.status();
        let mut response_headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let bytes = upstream_response.bytes().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Failed to read upstream response: {}", e))
        })?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;

        Ok(response)
    }
}
