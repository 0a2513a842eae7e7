//! Per-client, per-route admission control.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | `/rate/limit/register` | Store a new configuration |
//! | PUT | `/rate/limit/update/{id}` | Overwrite a configuration |
//! | GET | `/rate/limit/{clientId}/{route}` | Active configuration for a pair |
//! | POST | `/rate/limit/invalidate/{clientId}/{route}` | Drop cached state for a pair |
//! | GET | `/monitor` | Token counts of cached buckets |
//!
//! Proxied traffic passes through [`middleware::admission_middleware`].

pub mod bucket;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use services::{RateLimitConfigService, RateLimitEngine};
pub use store::{ConfigStore, InMemoryConfigStore, PgConfigStore};
