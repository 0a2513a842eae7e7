use std::sync::Arc;

use dashmap::DashMap;

use crate::core::config::RateLimitSettings;
use crate::features::rate_limits::bucket::{BucketSpec, TokenBucket};
use crate::features::rate_limits::models::{ResolvedLimit, RetryPolicy};

/// A live bucket together with the limit it was built from.
///
/// `limit` is `None` for the stand-in bucket installed while the config store
/// was failing; such an entry is replaced once the store answers again.
#[derive(Debug)]
pub struct BucketEntry {
    pub bucket: TokenBucket,
    pub limit: Option<Arc<ResolvedLimit>>,
}

impl BucketEntry {
    pub fn configured(limit: Arc<ResolvedLimit>) -> Self {
        Self {
            bucket: TokenBucket::new(limit.bucket.clone()),
            limit: Some(limit),
        }
    }

    pub fn store_unavailable(settings: &RateLimitSettings) -> Self {
        Self {
            bucket: TokenBucket::new(BucketSpec::fallback(settings)),
            limit: None,
        }
    }

    pub fn is_built_from(&self, limit: &Arc<ResolvedLimit>) -> bool {
        self.limit
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, limit))
    }

    pub fn retry_policy(&self, settings: &RateLimitSettings) -> RetryPolicy {
        self.limit
            .as_ref()
            .map(|limit| limit.retry.clone())
            .unwrap_or_else(|| RetryPolicy::none(settings.default_retry_delay))
    }
}

/// Live token buckets keyed by `clientId:route`.
///
/// Buckets are created on first access and kept until invalidated. Creation
/// holds the key's shard lock, so concurrent first requests for a key all
/// receive the same bucket.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    buckets: DashMap<String, Arc<BucketEntry>>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<BucketEntry>> {
        self.buckets.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the entry for `key`, building it with `create` if absent
    pub fn get_or_create<F>(&self, key: &str, create: F) -> Arc<BucketEntry>
    where
        F: FnOnce() -> BucketEntry,
    {
        if let Some(entry) = self.get(key) {
            return entry;
        }

        Arc::clone(
            self.buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(create()))
                .value(),
        )
    }

    /// Drops the bucket for `key`; returns whether one was cached
    pub fn remove(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    /// Drops the entry for `key` only if it is still `entry`
    pub fn remove_if_same(&self, key: &str, entry: &Arc<BucketEntry>) -> bool {
        self.buckets
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// All cached entries, cloned out so no shard stays locked while callers read them
    pub fn entries(&self) -> Vec<(String, Arc<BucketEntry>)> {
        self.buckets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(capacity: u64) -> BucketEntry {
        let settings = RateLimitSettings {
            default_capacity: capacity,
            ..RateLimitSettings::default()
        };
        BucketEntry::configured(Arc::new(ResolvedLimit::fallback(&settings)))
    }

    #[test]
    fn test_get_or_create_reuses_bucket() {
        let registry = BucketRegistry::new();
        let first = registry.get_or_create("client-a:/orders", || entry(5));
        let second = registry.get_or_create("client-a:/orders", || entry(50));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.bucket.capacity(), 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_first_access_creates_once() {
        let registry = Arc::new(BucketRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                std::thread::spawn(move || {
                    registry.get_or_create("client-a:/orders", || {
                        created.fetch_add(1, Ordering::SeqCst);
                        entry(5)
                    })
                })
            })
            .collect();

        let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(entries.iter().all(|e| Arc::ptr_eq(e, &entries[0])));
    }

    #[test]
    fn test_remove() {
        let registry = BucketRegistry::new();
        registry.get_or_create("client-a:/orders", || entry(5));

        assert!(registry.remove("client-a:/orders"));
        assert!(!registry.remove("client-a:/orders"));
        assert!(registry.get("client-a:/orders").is_none());
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn test_remove_if_same_keeps_replacement() {
        let registry = BucketRegistry::new();
        let stale = registry.get_or_create("client-a:/orders", || entry(5));
        registry.remove("client-a:/orders");
        let fresh = registry.get_or_create("client-a:/orders", || entry(7));

        assert!(!registry.remove_if_same("client-a:/orders", &stale));
        assert!(registry.remove_if_same("client-a:/orders", &fresh));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_store_unavailable_entry_has_no_limit() {
        let settings = RateLimitSettings::default();
        let entry = BucketEntry::store_unavailable(&settings);

        assert!(entry.limit.is_none());
        assert_eq!(entry.bucket.capacity(), 100);
        assert_eq!(
            entry.retry_policy(&settings),
            RetryPolicy::none(settings.default_retry_delay)
        );
    }
}
