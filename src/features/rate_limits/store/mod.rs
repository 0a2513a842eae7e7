//! Persistence boundary for rate limit configurations.
//!
//! The gateway only needs three query shapes, so the store is a small trait
//! with a Postgres implementation and an in-memory one.

mod memory;
mod postgres;

pub use memory::InMemoryConfigStore;
pub use postgres::PgConfigStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::rate_limits::models::RateLimitConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("A config for client '{client_id}' and route '{route}' already exists")]
    Duplicate { client_id: String, route: String },

    #[error("Config store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Duplicate { .. } => AppError::Conflict(err.to_string()),
            StoreError::Unavailable(msg) => AppError::Internal(msg),
        }
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Inserts the config, or replaces the stored document with the same id
    async fn save(&self, config: RateLimitConfig) -> Result<RateLimitConfig, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RateLimitConfig>, StoreError>;

    /// First ACTIVE config for the pair, lowest priority value then oldest first
    async fn find_active_by_client_and_route(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitConfig>, StoreError>;
}
