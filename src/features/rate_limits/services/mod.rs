mod bucket_registry;
mod config_cache;
mod rate_limit_config_service;
mod rate_limit_engine;

pub use bucket_registry::{BucketEntry, BucketRegistry};
pub use config_cache::{CacheMiss, ConfigCache};
pub use rate_limit_config_service::RateLimitConfigService;
pub use rate_limit_engine::{BucketSnapshot, RateLimitEngine};
