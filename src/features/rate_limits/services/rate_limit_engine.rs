use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::{RateLimitSettings, StoreFailurePolicy};
use crate::features::rate_limits::models::{cache_key, LimitSource, ResolvedLimit, RetryPolicy};
use crate::features::rate_limits::services::{
    BucketEntry, BucketRegistry, CacheMiss, ConfigCache,
};
use crate::features::rate_limits::store::{ConfigStore, StoreError};
use crate::shared::constants::UNKNOWN_CAPACITY;

/// Upper bound on rebuilding a bucket whose config was invalidated mid-resolution
const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// Point-in-time view of one cached bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub available_tokens: u64,
    /// Capacity of the limit the bucket was built from, `UNKNOWN_CAPACITY`
    /// for the stand-in bucket used while the store was failing
    pub capacity: i64,
}

/// Answers "is this request admitted now" per client and route.
///
/// Buckets are looked up first; on a miss the limit is resolved through the
/// config cache, which queries the store at most once per key.
pub struct RateLimitEngine {
    store: Arc<dyn ConfigStore>,
    configs: ConfigCache,
    buckets: BucketRegistry,
    settings: RateLimitSettings,
}

impl RateLimitEngine {
    pub fn new(store: Arc<dyn ConfigStore>, settings: RateLimitSettings) -> Self {
        Self {
            store,
            configs: ConfigCache::new(settings.store_failure_backoff),
            buckets: BucketRegistry::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Consumes one token for `client_id` on `route` if available.
    ///
    /// Never retries and never fails: store errors are handled according to
    /// the configured `StoreFailurePolicy`. The store is consulted at most once.
    pub async fn admit(&self, client_id: &str, route: &str) -> bool {
        match self.bucket_for(client_id, route).await {
            Some(entry) => entry.bucket.try_consume(1),
            None => {
                tracing::warn!(
                    "Config store unavailable, admitting {}:{} without a bucket (fail-open)",
                    client_id,
                    route
                );
                true
            }
        }
    }

    /// Retry policy of the bucket currently serving the pair. Never queries the store.
    pub fn retry_policy(&self, client_id: &str, route: &str) -> RetryPolicy {
        self.buckets
            .get(&cache_key(client_id, route))
            .map(|entry| entry.retry_policy(&self.settings))
            .unwrap_or_else(|| RetryPolicy::none(self.settings.default_retry_delay))
    }

    /// Resolved limit for the pair, cached after the first successful lookup.
    ///
    /// Returns `None` when the store failed, or failed recently enough that
    /// the key is still backing off.
    async fn resolve_limit(&self, client_id: &str, route: &str) -> Option<Arc<ResolvedLimit>> {
        let key = cache_key(client_id, route);
        if let Some(limit) = self.configs.get(&key) {
            return Some(limit);
        }

        let result = self
            .configs
            .get_or_try_compute(&key, || async {
                let config = self
                    .store
                    .find_active_by_client_and_route(client_id, route)
                    .await?;
                let limit = ResolvedLimit::resolve(config.as_ref(), &self.settings);
                match limit.source {
                    LimitSource::Configured { config_id } => tracing::debug!(
                        "Resolved {} from config {}: capacity={}",
                        key,
                        config_id,
                        limit.capacity()
                    ),
                    LimitSource::Fallback => {
                        tracing::debug!("No usable active config for {}, using default bucket", key)
                    }
                }
                Ok::<_, StoreError>(limit)
            })
            .await;

        match result {
            Ok(limit) => Some(limit),
            Err(CacheMiss::Failed(e)) => {
                tracing::error!(
                    "Failed to resolve rate limit for {}: {}, skipping the store for {}ms",
                    key,
                    e,
                    self.settings.store_failure_backoff.as_millis()
                );
                None
            }
            Err(CacheMiss::BackingOff) => None,
        }
    }

    /// Drops the cached config and bucket for the pair; returns whether either existed
    pub fn invalidate(&self, client_id: &str, route: &str) -> bool {
        let key = cache_key(client_id, route);
        let had_config = self.configs.remove(&key);
        let had_bucket = self.buckets.remove(&key);
        if had_config || had_bucket {
            tracing::info!(
                "Invalidated rate limit cache for {} ({} buckets cached)",
                key,
                self.buckets.len()
            );
        }
        had_config || had_bucket
    }

    /// Token counts and capacities of every cached bucket. Reading does not
    /// refill or consume.
    pub fn snapshot(&self) -> BTreeMap<String, BucketSnapshot> {
        self.buckets
            .entries()
            .into_iter()
            .map(|(key, entry)| {
                let capacity = entry
                    .limit
                    .as_ref()
                    .map(|limit| limit.capacity() as i64)
                    .unwrap_or(UNKNOWN_CAPACITY);
                let snapshot = BucketSnapshot {
                    available_tokens: entry.bucket.available_tokens(),
                    capacity,
                };
                (key, snapshot)
            })
            .collect()
    }

    #[cfg(test)]
    pub fn cached_buckets(&self) -> usize {
        self.buckets.len()
    }

    async fn bucket_for(&self, client_id: &str, route: &str) -> Option<Arc<BucketEntry>> {
        let key = cache_key(client_id, route);

        let mut attempts = 0;

        loop {
            attempts += 1;

            let current = self.buckets.get(&key);
            if current.as_ref().is_some_and(|entry| entry.limit.is_some()) {
                return current;
            }

            let Some(limit) = self.resolve_limit(client_id, route).await else {
                return match self.settings.store_failure_policy {
                    StoreFailurePolicy::FailClosed => Some(current.unwrap_or_else(|| {
                        self.buckets.get_or_create(&key, || {
                            BucketEntry::store_unavailable(&self.settings)
                        })
                    })),
                    StoreFailurePolicy::FailOpen => None,
                };
            };

            // The store answered again; retire the stand-in bucket
            if let Some(stand_in) = &current {
                if self.buckets.remove_if_same(&key, stand_in) {
                    tracing::info!("Config store recovered for {}, rebuilding bucket", key);
                }
            }

            let entry = self
                .buckets
                .get_or_create(&key, || BucketEntry::configured(Arc::clone(&limit)));

            // An invalidation between resolving and creating leaves a bucket
            // built from a dropped config; discard it and resolve again.
            let still_current = self
                .configs
                .get(&key)
                .is_some_and(|current| entry.is_built_from(&current));
            if still_current || attempts >= MAX_RESOLVE_ATTEMPTS {
                return Some(entry);
            }
            self.buckets.remove_if_same(&key, &entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rate_limits::models::RateLimitConfig;
    use crate::features::rate_limits::store::InMemoryConfigStore;
    use crate::shared::test_helpers::{sample_config, FailingConfigStore, RecoveringConfigStore};
    use std::time::Duration;

    async fn engine_with(
        configs: Vec<RateLimitConfig>,
    ) -> (Arc<InMemoryConfigStore>, RateLimitEngine) {
        let store = Arc::new(InMemoryConfigStore::new());
        for config in configs {
            store.save(config).await.unwrap();
        }
        let engine = RateLimitEngine::new(store.clone(), RateLimitSettings::default());
        (store, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_capacity_includes_burst() {
        let (_store, engine) =
            engine_with(vec![sample_config("client-a", "/orders", 10, 5)]).await;

        for _ in 0..15 {
            assert!(engine.admit("client-a", "/orders").await);
        }
        assert!(!engine.admit("client-a", "/orders").await);

        let snapshot = engine.snapshot();
        assert_eq!(
            snapshot.get("client-a:/orders"),
            Some(&BucketSnapshot {
                available_tokens: 0,
                capacity: 15
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_bucket_without_config() {
        let (_store, engine) = engine_with(vec![]).await;

        for _ in 0..100 {
            assert!(engine.admit("client-b", "/anything").await);
        }
        assert!(!engine.admit("client-b", "/anything").await);

        // Full refill of 100 per minute
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(engine.admit("client-b", "/anything").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (_store, engine) = engine_with(vec![
            sample_config("client-a", "/orders", 1, 0),
            sample_config("client-b", "/orders", 1, 0),
        ])
        .await;

        assert!(engine.admit("client-a", "/orders").await);
        assert!(!engine.admit("client-a", "/orders").await);
        assert!(engine.admit("client-b", "/orders").await);
        assert_eq!(engine.cached_buckets(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_time_unit_uses_default_bucket() {
        let mut config = sample_config("client-a", "/orders", 2, 0);
        config.time_unit = "FORTNIGHTS".to_string();
        let (_store, engine) = engine_with(vec![config]).await;

        for _ in 0..100 {
            assert!(engine.admit("client-a", "/orders").await);
        }
        assert!(!engine.admit("client-a", "/orders").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_token_goes_to_exactly_one_caller() {
        let (_store, engine) =
            engine_with(vec![sample_config("client-a", "/orders", 0, 3)]).await;
        let engine = Arc::new(engine);

        assert!(engine.admit("client-a", "/orders").await);
        assert!(engine.admit("client-a", "/orders").await);

        let (first, second) = tokio::join!(
            {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.admit("client-a", "/orders").await })
            },
            {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.admit("client-a", "/orders").await })
            }
        );
        let admitted = [first.unwrap(), second.unwrap()];
        assert_eq!(admitted.iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_picks_up_new_config() {
        let (store, engine) =
            engine_with(vec![sample_config("client-a", "/orders", 2, 0)]).await;

        assert!(engine.admit("client-a", "/orders").await);
        assert_eq!(engine.snapshot()["client-a:/orders"].capacity, 2);

        let mut updated = store
            .find_active_by_client_and_route("client-a", "/orders")
            .await
            .unwrap()
            .unwrap();
        updated.requests_per_minute = 20;
        updated.burst_capacity = 5;
        store.save(updated).await.unwrap();

        // Still served from the cached bucket
        assert_eq!(engine.snapshot()["client-a:/orders"].capacity, 2);

        assert!(engine.invalidate("client-a", "/orders"));
        assert!(engine.snapshot().is_empty());

        assert!(engine.admit("client-a", "/orders").await);
        assert_eq!(
            engine.snapshot()["client-a:/orders"],
            BucketSnapshot {
                available_tokens: 24,
                capacity: 25
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fail_closed_uses_fallback_bucket() {
        let engine = RateLimitEngine::new(
            Arc::new(FailingConfigStore),
            RateLimitSettings {
                default_capacity: 3,
                ..RateLimitSettings::default()
            },
        );

        for _ in 0..3 {
            assert!(engine.admit("client-a", "/orders").await);
        }
        assert!(!engine.admit("client-a", "/orders").await);
        assert_eq!(
            engine.snapshot()["client-a:/orders"],
            BucketSnapshot {
                available_tokens: 0,
                capacity: UNKNOWN_CAPACITY
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fail_open_admits_without_caching() {
        let engine = RateLimitEngine::new(
            Arc::new(FailingConfigStore),
            RateLimitSettings {
                default_capacity: 1,
                store_failure_policy: StoreFailurePolicy::FailOpen,
                ..RateLimitSettings::default()
            },
        );

        for _ in 0..5 {
            assert!(engine.admit("client-a", "/orders").await);
        }
        assert_eq!(engine.cached_buckets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_does_not_consume() {
        let (_store, engine) =
            engine_with(vec![sample_config("client-a", "/orders", 5, 0)]).await;
        assert!(engine.admit("client-a", "/orders").await);

        for _ in 0..5 {
            assert_eq!(engine.snapshot()["client-a:/orders"].available_tokens, 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_recovery_replaces_stand_in_bucket() {
        let store = Arc::new(
            RecoveringConfigStore::new(2, vec![sample_config("client-a", "/orders", 10, 5)]).await,
        );
        let engine = RateLimitEngine::new(store.clone(), RateLimitSettings::default());

        assert!(engine.admit("client-a", "/orders").await);
        assert_eq!(
            engine.snapshot()["client-a:/orders"].capacity,
            UNKNOWN_CAPACITY
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(engine.admit("client-a", "/orders").await);
        tokio::time::advance(Duration::from_secs(1)).await;

        let mut admitted = 0;
        for _ in 0..40 {
            if engine.admit("client-a", "/orders").await {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 15);
        assert_eq!(
            engine.snapshot()["client-a:/orders"],
            BucketSnapshot {
                available_tokens: 0,
                capacity: 15
            }
        );
        assert_eq!(store.lookups(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_backs_off_lookups() {
        let store = Arc::new(RecoveringConfigStore::new(usize::MAX, vec![]).await);
        let engine = RateLimitEngine::new(store.clone(), RateLimitSettings::default());

        for _ in 0..20 {
            assert!(engine.admit("client-a", "/orders").await);
        }
        assert_eq!(store.lookups(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(engine.admit("client-a", "/orders").await);
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_open_queries_store_once_per_backoff() {
        let store = Arc::new(RecoveringConfigStore::new(usize::MAX, vec![]).await);
        let engine = RateLimitEngine::new(
            store.clone(),
            RateLimitSettings {
                store_failure_policy: StoreFailurePolicy::FailOpen,
                ..RateLimitSettings::default()
            },
        );

        for _ in 0..5 {
            assert!(engine.admit("client-a", "/orders").await);
            assert_eq!(engine.retry_policy("client-a", "/orders").max_retries, 0);
        }
        assert_eq!(store.lookups(), 1);
        assert_eq!(engine.cached_buckets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_follows_serving_bucket() {
        let mut config = sample_config("client-a", "/orders", 1, 0);
        config
            .custom_attributes
            .insert("maxRetries".to_string(), "2".to_string());
        config
            .custom_attributes
            .insert("retryDelay".to_string(), "250".to_string());
        let (_store, engine) = engine_with(vec![config]).await;

        assert_eq!(engine.retry_policy("client-a", "/orders").max_retries, 0);

        assert!(engine.admit("client-a", "/orders").await);
        assert!(!engine.admit("client-a", "/orders").await);
        assert_eq!(
            engine.retry_policy("client-a", "/orders"),
            RetryPolicy {
                max_retries: 2,
                retry_delay: Duration::from_millis(250)
            }
        );
    }
}
