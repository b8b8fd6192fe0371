//! Kubernetes node lifecycle and the resolved-node inventory.

pub mod address_policy;
mod index;
pub mod manager;

pub use manager::NodeManager;
