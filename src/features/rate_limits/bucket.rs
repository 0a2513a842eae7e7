//! Token bucket with greedy refill.
//!
//! Tokens flow back continuously at `refill_tokens / refill_period` up to
//! `capacity`. Partial progress toward the next token is carried in integer
//! token-nanoseconds. Time is read from `tokio::time::Instant`, so buckets
//! follow a paused test clock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::RateLimitSettings;

/// Shape of a bucket: how many tokens it holds and how fast they come back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub capacity: u64,
    pub refill_tokens: u64,
    pub refill_period: Duration,
}

impl BucketSpec {
    /// Bucket used when a key has no usable active config
    pub fn fallback(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.default_capacity,
            refill_tokens: settings.default_capacity,
            refill_period: settings.default_refill_period,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    tokens: u64,
    /// Refill progress toward the next whole token, in token-nanoseconds
    carry: u128,
    last_refill: Instant,
}

/// Thread-safe token bucket. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    spec: BucketSpec,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(spec: BucketSpec) -> Self {
        let tokens = spec.capacity;
        Self {
            spec,
            state: Mutex::new(BucketState {
                tokens,
                carry: 0,
                last_refill: Instant::now(),
            }),
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> u64 {
        self.spec.capacity
    }

    /// Takes `tokens` if that many are available. Refill and consumption
    /// happen under one lock, so concurrent callers never overdraw.
    pub fn try_consume(&self, tokens: u64) -> bool {
        let mut state = self.lock();
        *state = self.refilled(&state, Instant::now());

        if state.tokens >= tokens {
            state.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// Whole tokens available right now. Does not advance the bucket.
    pub fn available_tokens(&self) -> u64 {
        let state = self.lock();
        self.refilled(&state, Instant::now()).tokens
    }

    fn refilled(&self, state: &BucketState, now: Instant) -> BucketState {
        let period = self.spec.refill_period.as_nanos();
        if period == 0 || self.spec.refill_tokens == 0 || state.tokens >= self.spec.capacity {
            return BucketState {
                tokens: state.tokens.min(self.spec.capacity),
                carry: 0,
                last_refill: now,
            };
        }

        let elapsed = now.saturating_duration_since(state.last_refill).as_nanos();
        let progress = state.carry + elapsed * u128::from(self.spec.refill_tokens);
        let gained = progress / period;
        let room = u128::from(self.spec.capacity - state.tokens);

        if gained >= room {
            BucketState {
                tokens: self.spec.capacity,
                carry: 0,
                last_refill: now,
            }
        } else {
            BucketState {
                // gained < room <= u64::MAX
                tokens: state.tokens + gained as u64,
                carry: progress % period,
                last_refill: now,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        // Every write replaces the whole state, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn spec(capacity: u64, refill_tokens: u64, refill_period: Duration) -> BucketSpec {
        BucketSpec {
            capacity,
            refill_tokens,
            refill_period,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_up_to_capacity() {
        let bucket = TokenBucket::new(spec(15, 10, Duration::from_secs(60)));

        for _ in 0..15 {
            assert!(bucket.try_consume(1));
        }
        assert!(!bucket.try_consume(1));
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greedy_refill() {
        let bucket = TokenBucket::new(spec(10, 10, Duration::from_secs(60)));
        for _ in 0..10 {
            assert!(bucket.try_consume(1));
        }
        assert!(!bucket.try_consume(1));

        // One token every six seconds
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(bucket.available_tokens(), 1);
        assert!(bucket.try_consume(1));
        assert!(!bucket.try_consume(1));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(bucket.available_tokens(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_never_refills() {
        let bucket = TokenBucket::new(spec(3, 0, Duration::from_secs(60)));
        for _ in 0..3 {
            assert!(bucket.try_consume(1));
        }

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!bucket.try_consume(1));
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_tokens_is_read_only() {
        let bucket = TokenBucket::new(spec(5, 5, Duration::from_secs(60)));
        assert!(bucket.try_consume(1));

        for _ in 0..10 {
            assert_eq!(bucket.available_tokens(), 4);
        }
        assert_eq!(bucket.capacity(), 5);
    }

    #[test]
    fn test_concurrent_consumers_never_overdraw() {
        let bucket = Arc::new(TokenBucket::new(spec(1, 0, Duration::from_secs(60))));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                std::thread::spawn(move || bucket.try_consume(1))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
