pub mod auth;
pub mod client;
pub mod http_client;
pub mod value_range_factory;
