pub mod api;
pub mod client;
pub mod config;
pub mod flag_definitions;
pub mod manifest;
pub mod manifest_endpoint;
pub mod metrics_consts;
pub mod metrics_utils;
pub mod router;
pub mod server;
pub mod test_utils;
pub mod transformer;
