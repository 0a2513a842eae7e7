use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{
    get_monitor, get_rate_limit, get_rate_limit_for_invalidate_client,
    get_rate_limit_for_register_client, get_rate_limit_for_update_client, invalidate_rate_limit,
    register_rate_limit, update_rate_limit,
};
use super::services::{RateLimitConfigService, RateLimitEngine};

/// Configuration management and monitor routes. These are not behind admission.
pub fn routes(config_service: Arc<RateLimitConfigService>, engine: Arc<RateLimitEngine>) -> Router {
    let config_routes = Router::new()
        .route("/rate/limit/register", post(register_rate_limit))
        .route(
            "/rate/limit/register/{*route}",
            get(get_rate_limit_for_register_client),
        )
        .route(
            "/rate/limit/update/{id}",
            put(update_rate_limit).get(get_rate_limit_for_update_client),
        )
        .route(
            "/rate/limit/invalidate/{client_id}/{*route}",
            post(invalidate_rate_limit).get(get_rate_limit_for_invalidate_client),
        )
        .route("/rate/limit/{client_id}/{*route}", get(get_rate_limit))
        .with_state(config_service);

    let monitor_routes = Router::new()
        .route("/monitor", get(get_monitor))
        .with_state(engine);

    config_routes.merge(monitor_routes)
}
