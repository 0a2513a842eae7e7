use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConfigStore, StoreError};
use crate::features::rate_limits::models::RateLimitConfig;

/// Process-local store used when no database is configured
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<Vec<RateLimitConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn save(&self, config: RateLimitConfig) -> Result<RateLimitConfig, StoreError> {
        let mut configs = self.configs.write().await;

        let duplicate = configs.iter().any(|existing| {
            existing.id != config.id
                && existing.client_id == config.client_id
                && existing.route == config.route
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                client_id: config.client_id,
                route: config.route,
            });
        }

        match configs.iter_mut().find(|existing| existing.id == config.id) {
            Some(existing) => *existing = config.clone(),
            None => configs.push(config.clone()),
        }

        Ok(config)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RateLimitConfig>, StoreError> {
        let configs = self.configs.read().await;
        Ok(configs.iter().find(|c| c.id == id).cloned())
    }

    async fn find_active_by_client_and_route(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitConfig>, StoreError> {
        let configs = self.configs.read().await;
        Ok(configs
            .iter()
            .filter(|c| c.client_id == client_id && c.route == route && c.is_active())
            .min_by_key(|c| (c.priority, c.created_at))
            .cloned())
    }
}
