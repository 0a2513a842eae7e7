//! Pass-through forwarder behind the admission middleware.
//!
//! Relays admitted requests to `UPSTREAM_URL`; answers 502 when none is set.

pub mod handler;
pub mod routes;
pub mod service;

pub use service::ProxyService;
