mod rate_limit_config;
mod resolved_limit;

pub use rate_limit_config::{cache_key, ConfigStatus, RateLimitConfig, TimeUnit};
pub use resolved_limit::{LimitSource, ResolvedLimit, RetryPolicy};
