use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConfigStore, StoreError};
use crate::features::rate_limits::models::{ConfigStatus, RateLimitConfig};

/// Unique index over `(client_id, route)`, see migrations
const CLIENT_ROUTE_INDEX: &str = "rate_limit_configs_client_route_key";

pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Connection-level failures mean the store is unreachable rather than the query being wrong
fn map_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn map_write_error(e: sqlx::Error, config: &RateLimitConfig) -> StoreError {
    let is_duplicate = e
        .as_database_error()
        .and_then(|db| db.constraint())
        .is_some_and(|constraint| constraint == CLIENT_ROUTE_INDEX);

    if is_duplicate {
        StoreError::Duplicate {
            client_id: config.client_id.clone(),
            route: config.route.clone(),
        }
    } else {
        tracing::error!("Failed to save rate limit config {}: {:?}", config.id, e);
        map_error(e)
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn save(&self, config: RateLimitConfig) -> Result<RateLimitConfig, StoreError> {
        sqlx::query_as::<_, RateLimitConfig>(
            r#"
            INSERT INTO rate_limit_configs (
                id, client_id, route, requests_per_minute, time_window, time_unit,
                burst_capacity, priority, status, expiration_date, custom_attributes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                client_id = EXCLUDED.client_id,
                route = EXCLUDED.route,
                requests_per_minute = EXCLUDED.requests_per_minute,
                time_window = EXCLUDED.time_window,
                time_unit = EXCLUDED.time_unit,
                burst_capacity = EXCLUDED.burst_capacity,
                priority = EXCLUDED.priority,
                status = EXCLUDED.status,
                expiration_date = EXCLUDED.expiration_date,
                custom_attributes = EXCLUDED.custom_attributes,
                updated_at = EXCLUDED.updated_at
            RETURNING id, client_id, route, requests_per_minute, time_window, time_unit,
                burst_capacity, priority, status, expiration_date, custom_attributes,
                created_at, updated_at
            "#,
        )
        .bind(config.id)
        .bind(&config.client_id)
        .bind(&config.route)
        .bind(config.requests_per_minute)
        .bind(config.time_window)
        .bind(&config.time_unit)
        .bind(config.burst_capacity)
        .bind(config.priority)
        .bind(config.status)
        .bind(config.expiration_date)
        .bind(&config.custom_attributes)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &config))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RateLimitConfig>, StoreError> {
        sqlx::query_as::<_, RateLimitConfig>(
            r#"
            SELECT id, client_id, route, requests_per_minute, time_window, time_unit,
                burst_capacity, priority, status, expiration_date, custom_attributes,
                created_at, updated_at
            FROM rate_limit_configs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get rate limit config {}: {:?}", id, e);
            map_error(e)
        })
    }

    async fn find_active_by_client_and_route(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitConfig>, StoreError> {
        sqlx::query_as::<_, RateLimitConfig>(
            r#"
            SELECT id, client_id, route, requests_per_minute, time_window, time_unit,
                burst_capacity, priority, status, expiration_date, custom_attributes,
                created_at, updated_at
            FROM rate_limit_configs
            WHERE client_id = $1 AND route = $2 AND status = $3
            ORDER BY priority ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(client_id)
        .bind(route)
        .bind(ConfigStatus::Active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to find active rate limit config for {}:{}: {:?}",
                client_id,
                route,
                e
            );
            map_error(e)
        })
    }
}
