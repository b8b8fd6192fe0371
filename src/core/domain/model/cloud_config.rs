//! Cloud provider configuration file model.
//!
//! Parsing, environment overlay and validation live in
//! `core::infrastructure::config_loader`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_API_BINDING: &str = ":43001";
pub const DEFAULT_IP_FAMILY: &str = "ipv4";
pub const DEFAULT_SESSION_LIFETIME_SECS: u64 = 1800;

/// Top-level provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CloudConfig {
    pub global: GlobalConfig,
    /// Per-endpoint sections keyed by tenant reference.
    pub icenters: BTreeMap<String, ICenterConfig>,
    pub nodes: NodesConfig,
    pub labels: LabelsConfig,
    pub discovery: DiscoveryConfig,
}

/// Settings shared by every endpoint unless overridden.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalConfig {
    pub user: String,
    pub password: String,
    /// Legacy single-endpoint address.
    pub server: String,
    pub port: Option<u16>,
    /// Accept self-signed endpoint certificates.
    pub insecure_flag: bool,
    /// Comma-separated datacenter allow-list.
    pub datacenters: String,
    pub secret_name: String,
    pub secret_namespace: String,
    /// Directory holding `<server>.username` / `<server>.password` files.
    pub secrets_directory: String,
    pub api_disable: bool,
    pub api_binding: String,
    /// Comma-separated IP family priority, e.g. `ipv6,ipv4`.
    pub ip_family: String,
    pub session_lifetime_secs: u64,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            server: String::new(),
            port: None,
            insecure_flag: false,
            datacenters: String::new(),
            secret_name: String::new(),
            secret_namespace: String::new(),
            secrets_directory: String::new(),
            api_disable: false,
            api_binding: DEFAULT_API_BINDING.to_string(),
            ip_family: DEFAULT_IP_FAMILY.to_string(),
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            rate_limit: None,
        }
    }
}

impl GlobalConfig {
    /// True when exactly one secret source is configured: a Kubernetes
    /// secret (name and namespace) or a secrets directory.
    pub fn is_secret_info_provided(&self) -> bool {
        let k8s_secret = !self.secret_name.is_empty() && !self.secret_namespace.is_empty();
        let no_k8s_secret = self.secret_name.is_empty() && self.secret_namespace.is_empty();
        let directory = !self.secrets_directory.is_empty();
        (k8s_secret && !directory) || (no_k8s_secret && directory)
    }
}

/// One `icenters.<tenant>` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ICenterConfig {
    pub user: String,
    pub password: String,
    /// When set, the section key is only the tenant reference and this is
    /// the endpoint address.
    pub server: String,
    pub port: Option<u16>,
    pub insecure_flag: bool,
    pub datacenters: String,
    pub secret_name: String,
    pub secret_namespace: String,
    pub ip_family: String,
}

impl ICenterConfig {
    pub fn is_secret_info_provided(&self) -> bool {
        !self.secret_name.is_empty() && !self.secret_namespace.is_empty()
    }
}

/// Node address selection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NodesConfig {
    pub internal_network_subnet_cidr: String,
    pub external_network_subnet_cidr: String,
    pub internal_vm_network_name: String,
    pub external_vm_network_name: String,
}

/// Tag categories carrying zone and region.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub zone: String,
    pub region: String,
}

/// Fan-out search tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DiscoveryConfig {
    /// Worker tasks per search.
    pub pool_size: usize,
    /// Capacity of the bounded work queue.
    pub queue_size: usize,
    /// Connect attempts per endpoint per search round.
    pub connection_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            queue_size: 80,
            connection_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}
