//! Chooses the Kubernetes addresses of a discovered VM.

use crate::core::domain::{
    error::{IcsError, IcsResult},
    model::{
        cloud_config::NodesConfig,
        inventory::VmRecord,
        node_info::{NodeAddress, NodeAddressType},
    },
    value_object::{IpFamily, ips_from_family},
};
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{debug, trace, warn};

/// Parsed address-selection settings.
///
/// Matching modes, by precedence: both CIDRs set (subnet matching), a network
/// name set (named-network matching), otherwise no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressPolicy {
    internal_subnet: Option<IpNet>,
    external_subnet: Option<IpNet>,
    internal_network: String,
    external_network: String,
}

fn parse_cidr(field: &str, value: &str) -> IcsResult<Option<IpNet>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<IpNet>().map(Some).map_err(|e| {
        IcsError::InvalidConfiguration(format!("invalid {} '{}': {}", field, value, e))
    })
}

/// Mapped IPv4 addresses are compared as IPv4.
fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

fn push_unique(addresses: &mut Vec<NodeAddress>, address: NodeAddress) {
    if !addresses.contains(&address) {
        addresses.push(address);
    }
}

impl AddressPolicy {
    /// # Errors
    /// `InvalidConfiguration` for a malformed CIDR.
    pub fn from_config(nodes: &NodesConfig) -> IcsResult<Self> {
        Ok(Self {
            internal_subnet: parse_cidr(
                "internal-network-subnet-cidr",
                &nodes.internal_network_subnet_cidr,
            )?,
            external_subnet: parse_cidr(
                "external-network-subnet-cidr",
                &nodes.external_network_subnet_cidr,
            )?,
            internal_network: nodes.internal_vm_network_name.trim().to_string(),
            external_network: nodes.external_vm_network_name.trim().to_string(),
        })
    }

    fn subnet_matching(&self) -> bool {
        self.internal_subnet.is_some() && self.external_subnet.is_some()
    }

    fn network_names_set(&self) -> bool {
        !self.internal_network.is_empty() || !self.external_network.is_empty()
    }

    fn is_internal_network(&self, name: &str) -> bool {
        !self.internal_network.is_empty() && self.internal_network.eq_ignore_ascii_case(name)
    }

    fn is_external_network(&self, name: &str) -> bool {
        !self.external_network.is_empty() && self.external_network.eq_ignore_ascii_case(name)
    }

    /// The VM's addresses: its name as a hostname, then the IPs picked by the
    /// configured mode in `families` order.
    ///
    /// Finding no IP is not an error; only the hostname is returned.
    pub fn select(&self, vm: &VmRecord, families: &[IpFamily]) -> Vec<NodeAddress> {
        let mut addresses = vec![NodeAddress::new(NodeAddressType::Hostname, &vm.name)];
        let mut found = false;

        for nic in &vm.nics {
            if !self.subnet_matching()
                && self.network_names_set()
                && !self.is_internal_network(&nic.network_name)
                && !self.is_external_network(&nic.network_name)
            {
                trace!(network = %nic.network_name, "Skipping NIC on an unselected network");
                continue;
            }

            for family in families {
                let ips = ips_from_family(*family, std::slice::from_ref(&nic.ip_address));

                if self.subnet_matching() {
                    for ip in ips {
                        let unmapped = unmap(ip);
                        if self.internal_subnet.is_some_and(|net| net.contains(&unmapped)) {
                            push_unique(&mut addresses, NodeAddress::new(NodeAddressType::InternalIp, ip.to_string()));
                            found = true;
                        }
                        if self.external_subnet.is_some_and(|net| net.contains(&unmapped)) {
                            push_unique(&mut addresses, NodeAddress::new(NodeAddressType::ExternalIp, ip.to_string()));
                            found = true;
                        }
                    }
                } else if self.is_internal_network(&nic.network_name) {
                    if let Some(ip) = ips.first() {
                        debug!(ip = %ip, "Adding internal IP by network name");
                        push_unique(&mut addresses, NodeAddress::new(NodeAddressType::InternalIp, ip.to_string()));
                        found = true;
                    }
                } else if self.is_external_network(&nic.network_name) {
                    if let Some(ip) = ips.first() {
                        debug!(ip = %ip, "Adding external IP by network name");
                        push_unique(&mut addresses, NodeAddress::new(NodeAddressType::ExternalIp, ip.to_string()));
                        found = true;
                    }
                } else if let Some(ip) = ips.first() {
                    push_unique(&mut addresses, NodeAddress::new(NodeAddressType::ExternalIp, ip.to_string()));
                    push_unique(&mut addresses, NodeAddress::new(NodeAddressType::InternalIp, ip.to_string()));
                    found = true;
                }

                if found {
                    break;
                }
            }
        }

        if !found {
            warn!(vm = %vm.name, families = ?families, "Unable to find a suitable IP address");
        }
        addresses
    }
}

/// `ics-vm.cpu-<n>.mem-<GiB>gb.os-<first word of the guest OS label>`
pub fn instance_type(vm: &VmRecord) -> String {
    let os = vm.guest_os_label.split_whitespace().next().unwrap_or("unknown");
    format!(
        "ics-vm.cpu-{}.mem-{}gb.os-{}",
        vm.cpu_num,
        vm.memory_mb / 1024,
        os
    )
}
