use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::features::rate_limits::models::{ConfigStatus, RateLimitConfig};
use crate::features::rate_limits::services::BucketSnapshot;

fn default_time_window() -> i64 {
    1
}

fn default_time_unit() -> String {
    "MINUTES".to_string()
}

fn validate_route(route: &str) -> Result<(), ValidationError> {
    if route.starts_with('/') {
        Ok(())
    } else {
        Err(ValidationError::new("route_prefix").with_message("Route must start with '/'".into()))
    }
}

/// Request DTO for registering or updating a rate limit configuration
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfigDto {
    #[validate(length(min = 1, message = "clientId is required"))]
    pub client_id: String,

    #[validate(
        length(min = 1, message = "route is required"),
        custom(function = "validate_route")
    )]
    pub route: String,

    /// Tokens added back per time window
    #[validate(range(min = 0, message = "requestsPerMinute must not be negative"))]
    pub requests_per_minute: i64,

    #[serde(default = "default_time_window")]
    #[validate(range(min = 1, message = "timeWindow must be at least 1"))]
    pub time_window: i64,

    /// SECONDS, MINUTES or HOURS (case-insensitive)
    #[serde(default = "default_time_unit")]
    pub time_unit: String,

    /// Extra tokens on top of `requestsPerMinute`; negative values count as 0
    #[serde(default)]
    pub burst_capacity: i64,

    /// Lower wins when several active configs share a client and route
    #[serde(default)]
    pub priority: i32,

    pub status: ConfigStatus,

    pub expiration_date: Option<DateTime<Utc>>,

    /// Free-form attributes; `maxRetries` and `retryDelay` drive admission retries
    #[serde(default)]
    pub custom_attributes: HashMap<String, String>,
}

/// Response DTO for rate limit configuration
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfigResponseDto {
    pub id: Uuid,
    pub client_id: String,
    pub route: String,
    pub requests_per_minute: i64,
    pub time_window: i64,
    pub time_unit: String,
    pub burst_capacity: i64,
    pub priority: i32,
    pub status: ConfigStatus,
    pub expiration_date: Option<DateTime<Utc>>,
    pub custom_attributes: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<RateLimitConfig> for RateLimitConfigResponseDto {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            id: config.id,
            client_id: config.client_id,
            route: config.route,
            requests_per_minute: config.requests_per_minute,
            time_window: config.time_window,
            time_unit: config.time_unit,
            burst_capacity: config.burst_capacity,
            priority: config.priority,
            status: config.status,
            expiration_date: config.expiration_date,
            custom_attributes: config.custom_attributes.0,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

/// Monitor entry for one cached bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketSnapshotDto {
    pub available_tokens: u64,
    /// `-1` when the bucket has no cached config (store failure)
    pub capacity: i64,
}

impl From<BucketSnapshot> for BucketSnapshotDto {
    fn from(snapshot: BucketSnapshot) -> Self {
        Self {
            available_tokens: snapshot.available_tokens,
            capacity: snapshot.capacity,
        }
    }
}

/// Response DTO for cache invalidation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvalidateResponseDto {
    pub key: String,
    /// Whether a cached config or bucket was dropped
    pub removed: bool,
}
