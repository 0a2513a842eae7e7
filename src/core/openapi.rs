use utoipa::{Modify, OpenApi};

use crate::features::rate_limits::{
    dtos as rate_limits_dtos, handlers as rate_limits_handlers, models as rate_limits_models,
};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Rate limit configuration
        rate_limits_handlers::rate_limit_config_handler::register_rate_limit,
        rate_limits_handlers::rate_limit_config_handler::update_rate_limit,
        rate_limits_handlers::rate_limit_config_handler::get_rate_limit,
        rate_limits_handlers::rate_limit_config_handler::invalidate_rate_limit,
        // Monitor
        rate_limits_handlers::monitor_handler::get_monitor,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Rate Limits
            rate_limits_models::ConfigStatus,
            rate_limits_dtos::RateLimitConfigDto,
            rate_limits_dtos::RateLimitConfigResponseDto,
            rate_limits_dtos::BucketSnapshotDto,
            rate_limits_dtos::InvalidateResponseDto,
            ApiResponse<rate_limits_dtos::RateLimitConfigResponseDto>,
            ApiResponse<rate_limits_dtos::InvalidateResponseDto>,
        )
    ),
    tags(
        (name = "rate-limits", description = "Per-client, per-route rate limit configuration"),
        (name = "monitor", description = "Live token bucket state"),
    ),
    info(
        title = "Gateway Admission API",
        version = "0.1.0",
        description = "Per-client, per-route admission control",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
