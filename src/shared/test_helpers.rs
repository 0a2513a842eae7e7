use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::any, Router};
use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::features::rate_limits::dtos::RateLimitConfigDto;
use crate::features::rate_limits::middleware::admission_middleware;
use crate::features::rate_limits::models::{ConfigStatus, RateLimitConfig};
use crate::features::rate_limits::services::RateLimitEngine;
use crate::features::rate_limits::store::{ConfigStore, InMemoryConfigStore, StoreError};

/// Active config refilling `rpm` tokens per minute
pub fn sample_config(client_id: &str, route: &str, rpm: i64, burst: i64) -> RateLimitConfig {
    RateLimitConfig {
        id: Uuid::now_v7(),
        client_id: client_id.to_string(),
        route: route.to_string(),
        requests_per_minute: rpm,
        time_window: 1,
        time_unit: "MINUTES".to_string(),
        burst_capacity: burst,
        priority: 0,
        status: ConfigStatus::Active,
        expiration_date: None,
        custom_attributes: Json(HashMap::new()),
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn sample_dto(client_id: &str, route: &str, rpm: i64, burst: i64) -> RateLimitConfigDto {
    RateLimitConfigDto {
        client_id: client_id.to_string(),
        route: route.to_string(),
        requests_per_minute: rpm,
        time_window: 1,
        time_unit: "MINUTES".to_string(),
        burst_capacity: burst,
        priority: 0,
        status: ConfigStatus::Active,
        expiration_date: None,
        custom_attributes: HashMap::new(),
    }
}

/// Store whose every call fails, for exercising the store failure policy
pub struct FailingConfigStore;

#[async_trait]
impl ConfigStore for FailingConfigStore {
    async fn save(&self, _config: RateLimitConfig) -> Result<RateLimitConfig, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<RateLimitConfig>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }

    async fn find_active_by_client_and_route(
        &self,
        _client_id: &str,
        _route: &str,
    ) -> Result<Option<RateLimitConfig>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
}

/// Store that fails its first `failures` active-config lookups, then serves
/// from memory. Counts every lookup.
pub struct RecoveringConfigStore {
    inner: InMemoryConfigStore,
    failures: usize,
    lookups: AtomicUsize,
}

impl RecoveringConfigStore {
    pub async fn new(failures: usize, configs: Vec<RateLimitConfig>) -> Self {
        let inner = InMemoryConfigStore::new();
        for config in configs {
            inner.save(config).await.unwrap();
        }
        Self {
            inner,
            failures,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for RecoveringConfigStore {
    async fn save(&self, config: RateLimitConfig) -> Result<RateLimitConfig, StoreError> {
        self.inner.save(config).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RateLimitConfig>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_active_by_client_and_route(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitConfig>, StoreError> {
        let seen = self.lookups.fetch_add(1, Ordering::SeqCst);
        if seen < self.failures {
            return Err(StoreError::Unavailable("store is down".to_string()));
        }
        self.inner
            .find_active_by_client_and_route(client_id, route)
            .await
    }
}

/// Router with admission in front of a handler that counts forwarded requests
pub fn admission_router(engine: Arc<RateLimitEngine>, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/api/{*rest}",
            any(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "forwarded"
                }
            }),
        )
        .layer(axum::middleware::from_fn_with_state(
            engine,
            admission_middleware,
        ))
}
