use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitSettings,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_size: usize,
}

/// Postgres settings. Without `DATABASE_URL` the gateway keeps its
/// configuration documents in memory.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// What the admission path does when the config store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Govern the key with the fallback bucket.
    FailClosed,
    /// Admit without consuming a token.
    FailOpen,
}

impl FromStr for StoreFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            "fail_open" | "open" => Ok(Self::FailOpen),
            other => Err(format!(
                "RATE_LIMIT_STORE_FAILURE_POLICY must be 'fail_closed' or 'fail_open', got '{}'",
                other
            )),
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Header carrying the client identity (e.g. `X-Client-Id`)
    pub client_header: String,
    /// Capacity of the fallback bucket, also its refill amount per period
    pub default_capacity: u64,
    /// Refill period of the fallback bucket
    pub default_refill_period: Duration,
    /// Delay between admission retries when `retryDelay` is not configured
    pub default_retry_delay: Duration,
    /// Drop cached buckets for a key whenever its config is written
    pub invalidate_on_write: bool,
    pub store_failure_policy: StoreFailurePolicy,
    /// How long a key skips the store after a failed lookup
    pub store_failure_backoff: Duration,
}

/// Upstream the admitted requests are relayed to
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
            upstream: UpstreamConfig::from_env()?,
        })
    }
}

impl AppConfig {
    const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_request_body_size = env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUEST_BODY_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_REQUEST_BODY_SIZE must be a valid number".to_string())?;

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            max_request_body_size,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title =
            env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Gateway Admission API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Per-client, per-route admission control".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

impl RateLimitSettings {
    pub const DEFAULT_CLIENT_HEADER: &'static str = "X-Client-Id";
    pub const DEFAULT_CAPACITY: u64 = 100;
    pub const DEFAULT_REFILL_SECS: u64 = 60;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
    pub const DEFAULT_STORE_FAILURE_BACKOFF_MS: u64 = 1000;

    pub fn from_env() -> Result<Self, String> {
        let client_header = env::var("RATE_LIMIT_CLIENT_HEADER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_CLIENT_HEADER.to_string());

        let default_capacity = env::var("RATE_LIMIT_DEFAULT_CAPACITY")
            .unwrap_or_else(|_| Self::DEFAULT_CAPACITY.to_string())
            .parse::<u64>()
            .map_err(|_| "RATE_LIMIT_DEFAULT_CAPACITY must be a valid number".to_string())?;

        let default_refill_secs = env::var("RATE_LIMIT_DEFAULT_REFILL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_REFILL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "RATE_LIMIT_DEFAULT_REFILL_SECS must be a valid number".to_string())?;
        if default_refill_secs == 0 {
            return Err("RATE_LIMIT_DEFAULT_REFILL_SECS must be at least 1".to_string());
        }

        let default_retry_delay_ms = env::var("RATE_LIMIT_DEFAULT_RETRY_DELAY_MS")
            .unwrap_or_else(|_| Self::DEFAULT_RETRY_DELAY_MS.to_string())
            .parse::<u64>()
            .map_err(|_| "RATE_LIMIT_DEFAULT_RETRY_DELAY_MS must be a valid number".to_string())?;

        let invalidate_on_write = env::var("RATE_LIMIT_INVALIDATE_ON_WRITE")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .map_err(|_| "RATE_LIMIT_INVALIDATE_ON_WRITE must be 'true' or 'false'".to_string())?;

        let store_failure_policy = env::var("RATE_LIMIT_STORE_FAILURE_POLICY")
            .unwrap_or_else(|_| "fail_closed".to_string())
            .parse::<StoreFailurePolicy>()?;

        let store_failure_backoff_ms = env::var("RATE_LIMIT_STORE_FAILURE_BACKOFF_MS")
            .unwrap_or_else(|_| Self::DEFAULT_STORE_FAILURE_BACKOFF_MS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                "RATE_LIMIT_STORE_FAILURE_BACKOFF_MS must be a valid number".to_string()
            })?;

        Ok(Self {
            client_header,
            default_capacity,
            default_refill_period: Duration::from_secs(default_refill_secs),
            default_retry_delay: Duration::from_millis(default_retry_delay_ms),
            invalidate_on_write,
            store_failure_policy,
            store_failure_backoff: Duration::from_millis(store_failure_backoff_ms),
        })
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            client_header: Self::DEFAULT_CLIENT_HEADER.to_string(),
            default_capacity: Self::DEFAULT_CAPACITY,
            default_refill_period: Duration::from_secs(Self::DEFAULT_REFILL_SECS),
            default_retry_delay: Duration::from_millis(Self::DEFAULT_RETRY_DELAY_MS),
            invalidate_on_write: true,
            store_failure_policy: StoreFailurePolicy::FailClosed,
            store_failure_backoff: Duration::from_millis(Self::DEFAULT_STORE_FAILURE_BACKOFF_MS),
        }
    }
}

impl UpstreamConfig {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("UPSTREAM_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "UPSTREAM_TIMEOUT_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
