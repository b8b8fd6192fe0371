//! Node records derived from discovered VMs.

use super::inventory::{Datacenter, VmRecord};
use k8s_openapi::api::core::v1::NodeAddress as K8sNodeAddress;

/// Kubernetes address kinds produced by the IP-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAddressType {
    Hostname,
    InternalIp,
    ExternalIp,
}

impl NodeAddressType {
    /// The `type` string Kubernetes expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeAddressType::Hostname => "Hostname",
            NodeAddressType::InternalIp => "InternalIP",
            NodeAddressType::ExternalIp => "ExternalIP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub address_type: NodeAddressType,
    pub address: String,
}

impl NodeAddress {
    pub fn new(address_type: NodeAddressType, address: impl Into<String>) -> Self {
        Self {
            address_type,
            address: address.into(),
        }
    }
}

impl From<&NodeAddress> for K8sNodeAddress {
    fn from(address: &NodeAddress) -> Self {
        K8sNodeAddress {
            address: address.address.clone(),
            type_: address.address_type.as_str().to_string(),
        }
    }
}

/// The provider's record of a resolved node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub tenant_ref: String,
    /// Endpoint address the VM lives on.
    pub ics_server: String,
    pub datacenter: Datacenter,
    pub vm: VmRecord,
    /// Canonical (lower-case) VM UUID.
    pub uuid: String,
    pub node_name: String,
    /// e.g. `ics-vm.cpu-4.mem-8gb.os-centos`
    pub instance_type: String,
    pub addresses: Vec<NodeAddress>,
}

/// Inventory view of a registered node as served to external callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub icenter: String,
    pub datacenter: String,
    pub name: String,
    pub uuid: String,
    pub dns_names: Vec<String>,
    pub addresses: Vec<String>,
}

impl From<&NodeInfo> for NodeRecord {
    /// Only external IPs and host names are exported.
    fn from(info: &NodeInfo) -> Self {
        let mut record = NodeRecord {
            icenter: info.ics_server.clone(),
            datacenter: info.datacenter.name.clone(),
            name: info.node_name.clone(),
            uuid: info.uuid.clone(),
            dns_names: Vec::new(),
            addresses: Vec::new(),
        };
        for address in &info.addresses {
            match address.address_type {
                NodeAddressType::ExternalIp => record.addresses.push(address.address.clone()),
                NodeAddressType::Hostname => record.dns_names.push(address.address.clone()),
                NodeAddressType::InternalIp => {}
            }
        }
        record
    }
}

/// What the cloud-controller-manager needs to initialise a node.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMetadata {
    pub provider_id: String,
    pub instance_type: String,
    pub node_addresses: Vec<K8sNodeAddress>,
    pub zone: Option<String>,
    pub region: Option<String>,
}
