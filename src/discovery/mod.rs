//! Endpoint connections and the concurrent searches run across them.

pub mod connection_manager;
mod fan_out;
mod list;
mod search;
mod zones;

pub use connection_manager::{ConnectionManager, EndpointConnection};
