use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::shared::constants::CACHE_KEY_SEPARATOR;

/// Lifecycle status of a rate limit configuration, matching the database enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "rate_limit_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigStatus {
    Active,
    Inactive,
    Pending,
}

impl std::fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigStatus::Active => write!(f, "ACTIVE"),
            ConfigStatus::Inactive => write!(f, "INACTIVE"),
            ConfigStatus::Pending => write!(f, "PENDING"),
        }
    }
}

/// Unit of a refill window. Stored as free text on the config so that an
/// unknown unit only surfaces when a bucket is built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn as_secs(&self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
        }
    }

    /// Length of `amount` of this unit, `None` on overflow
    pub fn window(&self, amount: u64) -> Option<Duration> {
        amount.checked_mul(self.as_secs()).map(Duration::from_secs)
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SECONDS" => Ok(TimeUnit::Seconds),
            "MINUTES" => Ok(TimeUnit::Minutes),
            "HOURS" => Ok(TimeUnit::Hours),
            other => Err(format!("Unknown time unit '{}'", other)),
        }
    }
}

/// Rate limit configuration for one client and route
#[derive(Debug, Clone, FromRow)]
pub struct RateLimitConfig {
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
    pub custom_attributes: Json<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RateLimitConfig {
    pub fn is_active(&self) -> bool {
        self.status == ConfigStatus::Active
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.client_id, &self.route)
    }

    /// Bucket capacity: sustained rate plus burst headroom, both clamped at zero
    pub fn capacity(&self) -> u64 {
        self.requests_per_minute.max(0) as u64 + self.burst_capacity.max(0) as u64
    }

    pub fn parsed_time_unit(&self) -> Result<TimeUnit, String> {
        self.time_unit.parse()
    }
}

/// Key shared by the config cache and the bucket registry
pub fn cache_key(client_id: &str, route: &str) -> String {
    format!("{}{}{}", client_id, CACHE_KEY_SEPARATOR, route)
}
