pub mod cloud_config;
pub mod discovery;
pub mod endpoint_config;
pub mod inventory;
pub mod node_info;
pub mod session_auth;
