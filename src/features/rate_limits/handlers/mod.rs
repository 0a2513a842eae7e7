pub mod monitor_handler;
pub mod rate_limit_config_handler;

pub use monitor_handler::get_monitor;
pub use rate_limit_config_handler::{
    get_rate_limit, get_rate_limit_for_invalidate_client, get_rate_limit_for_register_client,
    get_rate_limit_for_update_client, invalidate_rate_limit, register_rate_limit,
    update_rate_limit,
};
