use std::sync::Arc;

use axum::{extract::Request, extract::State, response::Response};

use crate::core::error::Result;
use crate::features::gateway::service::ProxyService;

/// Relay any admitted request to the upstream
pub async fn forward(State(proxy): State<Arc<ProxyService>>, req: Request) -> Result<Response> {
    proxy.forward(req).await
}
