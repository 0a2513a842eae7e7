use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::rate_limits::dtos::RateLimitConfigDto;
use crate::features::rate_limits::models::{RateLimitConfig, TimeUnit};
use crate::features::rate_limits::services::RateLimitEngine;
use crate::features::rate_limits::store::ConfigStore;

/// Service for registering, updating and looking up rate limit configurations
pub struct RateLimitConfigService {
    store: Arc<dyn ConfigStore>,
    engine: Arc<RateLimitEngine>,
}

impl RateLimitConfigService {
    pub fn new(store: Arc<dyn ConfigStore>, engine: Arc<RateLimitEngine>) -> Self {
        Self { store, engine }
    }

    /// Persist a new configuration
    pub async fn register(&self, dto: RateLimitConfigDto) -> Result<RateLimitConfig> {
        warn_on_unknown_unit(&dto);

        let config = RateLimitConfig {
            id: Uuid::now_v7(),
            client_id: dto.client_id,
            route: dto.route,
            requests_per_minute: dto.requests_per_minute,
            time_window: dto.time_window,
            time_unit: dto.time_unit,
            burst_capacity: dto.burst_capacity,
            priority: dto.priority,
            status: dto.status,
            expiration_date: dto.expiration_date,
            custom_attributes: Json(dto.custom_attributes),
            created_at: Utc::now(),
            updated_at: None,
        };

        let saved = self.store.save(config).await?;

        tracing::info!(
            "Rate limit config registered: id={}, key={}, status={}",
            saved.id,
            saved.cache_key(),
            saved.status
        );

        if self.engine.settings().invalidate_on_write {
            self.engine.invalidate(&saved.client_id, &saved.route);
        }

        Ok(saved)
    }

    /// Overwrite every mutable field of an existing configuration
    pub async fn update(&self, id: Uuid, dto: RateLimitConfigDto) -> Result<RateLimitConfig> {
        let mut config = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Rate limit config '{}' not found", id)))?;

        warn_on_unknown_unit(&dto);

        let previous = (config.client_id.clone(), config.route.clone());

        config.client_id = dto.client_id;
        config.route = dto.route;
        config.requests_per_minute = dto.requests_per_minute;
        config.time_window = dto.time_window;
        config.time_unit = dto.time_unit;
        config.burst_capacity = dto.burst_capacity;
        config.priority = dto.priority;
        config.status = dto.status;
        config.expiration_date = dto.expiration_date;
        config.custom_attributes = Json(dto.custom_attributes);
        config.updated_at = Some(Utc::now());

        let saved = self.store.save(config).await?;

        tracing::info!(
            "Rate limit config updated: id={}, key={}, status={}",
            saved.id,
            saved.cache_key(),
            saved.status
        );

        if self.engine.settings().invalidate_on_write {
            self.engine.invalidate(&previous.0, &previous.1);
            self.engine.invalidate(&saved.client_id, &saved.route);
        }

        Ok(saved)
    }

    /// Get the active configuration for a client and route
    pub async fn get_active(&self, client_id: &str, route: &str) -> Result<RateLimitConfig> {
        self.store
            .find_active_by_client_and_route(client_id, route)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No active rate limit config for client '{}' and route '{}'",
                    client_id, route
                ))
            })
    }

    /// Drop cached limit state so the next request re-reads the store
    pub fn invalidate(&self, client_id: &str, route: &str) -> bool {
        self.engine.invalidate(client_id, route)
    }
}

fn warn_on_unknown_unit(dto: &RateLimitConfigDto) {
    if let Err(e) = dto.time_unit.parse::<TimeUnit>() {
        tracing::warn!(
            "{} for {}:{}, requests will use the default bucket",
            e,
            dto.client_id,
            dto.route
        );
    }
}
