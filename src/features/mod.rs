pub mod gateway;
pub mod rate_limits;
