use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

use crate::core::config::RateLimitSettings;
use crate::features::rate_limits::bucket::BucketSpec;
use crate::features::rate_limits::models::RateLimitConfig;

/// Custom attribute holding the number of extra admission attempts
pub const MAX_RETRIES_ATTRIBUTE: &str = "maxRetries";

/// Custom attribute holding the pause between attempts, in milliseconds
pub const RETRY_DELAY_ATTRIBUTE: &str = "retryDelay";

/// Retry behaviour applied by the admission middleware after a denial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn none(retry_delay: Duration) -> Self {
        Self {
            max_retries: 0,
            retry_delay,
        }
    }

    /// Reads `maxRetries` and `retryDelay` from a config's custom attributes.
    ///
    /// Each value is parsed on its own; a malformed one is logged and replaced
    /// by its default without affecting the other.
    pub fn from_attributes(
        attributes: &HashMap<String, String>,
        default_delay: Duration,
        key: &str,
    ) -> Self {
        let max_retries = match attributes.get(MAX_RETRIES_ATTRIBUTE) {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid {} '{}' for {}: {}, using 0",
                    MAX_RETRIES_ATTRIBUTE,
                    raw,
                    key,
                    e
                );
                0
            }),
            None => 0,
        };

        let retry_delay = match attributes.get(RETRY_DELAY_ATTRIBUTE) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(
                        "Invalid {} '{}' for {}: {}, using {}ms",
                        RETRY_DELAY_ATTRIBUTE,
                        raw,
                        key,
                        e,
                        default_delay.as_millis()
                    );
                    default_delay
                }
            },
            None => default_delay,
        };

        Self {
            max_retries,
            retry_delay,
        }
    }
}

/// Where a resolved limit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSource {
    Configured { config_id: Uuid },
    Fallback,
}

/// Limit descriptor cached per `clientId:route`, parsed once from the active config
#[derive(Debug, Clone)]
pub struct ResolvedLimit {
    pub bucket: BucketSpec,
    pub retry: RetryPolicy,
    pub source: LimitSource,
}

impl ResolvedLimit {
    pub fn fallback(settings: &RateLimitSettings) -> Self {
        Self {
            bucket: BucketSpec::fallback(settings),
            retry: RetryPolicy::none(settings.default_retry_delay),
            source: LimitSource::Fallback,
        }
    }

    /// Builds the limit for a key from its active config, if any.
    ///
    /// An unusable refill window (unknown unit, non-positive length) keeps the
    /// config's retry policy but governs the key with the fallback bucket.
    pub fn resolve(config: Option<&RateLimitConfig>, settings: &RateLimitSettings) -> Self {
        let Some(config) = config else {
            return Self::fallback(settings);
        };

        let key = config.cache_key();
        let retry = RetryPolicy::from_attributes(
            &config.custom_attributes,
            settings.default_retry_delay,
            &key,
        );

        match Self::refill_window(config) {
            Ok(window) => Self {
                bucket: BucketSpec {
                    capacity: config.capacity(),
                    refill_tokens: config.requests_per_minute.max(0) as u64,
                    refill_period: window,
                },
                retry,
                source: LimitSource::Configured {
                    config_id: config.id,
                },
            },
            Err(reason) => {
                tracing::warn!(
                    "Config {} for {} is unusable ({}), falling back to default bucket",
                    config.id,
                    key,
                    reason
                );
                Self {
                    bucket: BucketSpec::fallback(settings),
                    retry,
                    source: LimitSource::Fallback,
                }
            }
        }
    }

    pub fn capacity(&self) -> u64 {
        self.bucket.capacity
    }

    fn refill_window(config: &RateLimitConfig) -> Result<Duration, String> {
        let unit = config.parsed_time_unit()?;
        if config.time_window <= 0 {
            return Err(format!("time window {} is not positive", config.time_window));
        }
        unit.window(config.time_window as u64)
            .ok_or_else(|| format!("time window {} overflows", config.time_window))
    }
}
