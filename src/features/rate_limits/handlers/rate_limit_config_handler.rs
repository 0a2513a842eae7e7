use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::rate_limits::dtos::{
    InvalidateResponseDto, RateLimitConfigDto, RateLimitConfigResponseDto,
};
use crate::features::rate_limits::models::cache_key;
use crate::features::rate_limits::services::RateLimitConfigService;
use crate::shared::types::ApiResponse;

/// Wildcard captures arrive without their leading slash
fn normalize_route(route: String) -> String {
    if route.starts_with('/') {
        route
    } else {
        format!("/{}", route)
    }
}

/// Register a rate limit configuration
#[utoipa::path(
    post,
    path = "/rate/limit/register",
    request_body = RateLimitConfigDto,
    responses(
        (status = 200, description = "Stored configuration", body = ApiResponse<RateLimitConfigResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "A configuration for this client and route already exists")
    ),
    tag = "rate-limits"
)]
pub async fn register_rate_limit(
    State(service): State<Arc<RateLimitConfigService>>,
    AppJson(dto): AppJson<RateLimitConfigDto>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let config = service.register(dto).await?;
    let response: RateLimitConfigResponseDto = config.into();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Overwrite a rate limit configuration by id
#[utoipa::path(
    put,
    path = "/rate/limit/update/{id}",
    params(
        ("id" = Uuid, Path, description = "Configuration id")
    ),
    request_body = RateLimitConfigDto,
    responses(
        (status = 200, description = "Updated configuration", body = ApiResponse<RateLimitConfigResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Configuration not found"),
        (status = 409, description = "A configuration for this client and route already exists")
    ),
    tag = "rate-limits"
)]
pub async fn update_rate_limit(
    State(service): State<Arc<RateLimitConfigService>>,
    Path(id): Path<String>,
    AppJson(dto): AppJson<RateLimitConfigDto>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::NotFound(format!("Rate limit config '{}' not found", id)))?;

    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let config = service.update(id, dto).await?;
    let response: RateLimitConfigResponseDto = config.into();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Get the active configuration for a client and route
#[utoipa::path(
    get,
    path = "/rate/limit/{client_id}/{route}",
    params(
        ("client_id" = String, Path, description = "Client identity"),
        ("route" = String, Path, description = "Route path, percent-encoded or as the remaining path")
    ),
    responses(
        (status = 200, description = "Active configuration", body = ApiResponse<RateLimitConfigResponseDto>),
        (status = 404, description = "No active configuration")
    ),
    tag = "rate-limits"
)]
pub async fn get_rate_limit(
    State(service): State<Arc<RateLimitConfigService>>,
    Path((client_id, route)): Path<(String, String)>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    lookup_active(&service, &client_id, route).await
}

// Client ids `register`, `update` and `invalidate` share their first segment
// with the management routes, so lookups for them land on these routes.

pub async fn get_rate_limit_for_register_client(
    State(service): State<Arc<RateLimitConfigService>>,
    Path(route): Path<String>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    lookup_active(&service, "register", route).await
}

pub async fn get_rate_limit_for_update_client(
    State(service): State<Arc<RateLimitConfigService>>,
    Path(route): Path<String>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    lookup_active(&service, "update", route).await
}

pub async fn get_rate_limit_for_invalidate_client(
    State(service): State<Arc<RateLimitConfigService>>,
    Path((first, rest)): Path<(String, String)>,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    lookup_active(&service, "invalidate", format!("{}/{}", first, rest)).await
}

async fn lookup_active(
    service: &RateLimitConfigService,
    client_id: &str,
    route: String,
) -> Result<Json<ApiResponse<RateLimitConfigResponseDto>>> {
    let route = normalize_route(route);
    let config = service.get_active(client_id, &route).await?;
    let response: RateLimitConfigResponseDto = config.into();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Drop the cached bucket and config for a client and route
#[utoipa::path(
    post,
    path = "/rate/limit/invalidate/{client_id}/{route}",
    params(
        ("client_id" = String, Path, description = "Client identity"),
        ("route" = String, Path, description = "Route path, percent-encoded or as the remaining path")
    ),
    responses(
        (status = 200, description = "Cache entry dropped if present", body = ApiResponse<InvalidateResponseDto>)
    ),
    tag = "rate-limits"
)]
pub async fn invalidate_rate_limit(
    State(service): State<Arc<RateLimitConfigService>>,
    Path((client_id, route)): Path<(String, String)>,
) -> Result<Json<ApiResponse<InvalidateResponseDto>>> {
    let route = normalize_route(route);
    let removed = service.invalidate(&client_id, &route);
    let response = InvalidateResponseDto {
        key: cache_key(&client_id, &route),
        removed,
    };

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}
