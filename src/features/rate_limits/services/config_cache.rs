use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::features::rate_limits::models::ResolvedLimit;

type Slot = Arc<OnceCell<Arc<ResolvedLimit>>>;

/// Why a lookup produced no limit
#[derive(Debug)]
pub enum CacheMiss<E> {
    /// The lookup ran and failed
    Failed(E),
    /// A recent failure for this key is still backing off; the lookup did not run
    BackingOff,
}

/// Resolved limits keyed by `clientId:route`.
///
/// Each key owns a `OnceCell`: concurrent misses wait on the same cell and
/// only one of them runs the store lookup. A failed lookup leaves the cell
/// empty and blocks further lookups for that key until `failure_backoff`
/// has passed.
#[derive(Debug)]
pub struct ConfigCache {
    slots: DashMap<String, Slot>,
    retry_after: DashMap<String, Instant>,
    failure_backoff: Duration,
}

impl ConfigCache {
    pub fn new(failure_backoff: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            retry_after: DashMap::new(),
            failure_backoff,
        }
    }

    pub async fn get_or_try_compute<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<Arc<ResolvedLimit>, CacheMiss<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolvedLimit, E>>,
    {
        let slot = self.slot(key);
        slot.get_or_try_init(|| async {
            if self.is_backing_off(key) {
                return Err(CacheMiss::BackingOff);
            }
            match compute().await {
                Ok(limit) => {
                    self.retry_after.remove(key);
                    Ok(Arc::new(limit))
                }
                Err(e) => {
                    self.retry_after
                        .insert(key.to_string(), Instant::now() + self.failure_backoff);
                    Err(CacheMiss::Failed(e))
                }
            }
        })
        .await
        .cloned()
    }

    /// The cached limit for `key`, if one has been resolved
    pub fn get(&self, key: &str) -> Option<Arc<ResolvedLimit>> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drops the entry and any failure back-off for `key`; returns whether a
    /// resolved limit was cached
    pub fn remove(&self, key: &str) -> bool {
        self.retry_after.remove(key);
        self.slots
            .remove(key)
            .is_some_and(|(_, slot)| slot.initialized())
    }

    fn is_backing_off(&self, key: &str) -> bool {
        self.retry_after
            .get(key)
            .is_some_and(|until| Instant::now() < *until)
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(key.to_string()).or_default().value())
    }
}
