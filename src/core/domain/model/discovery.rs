//! Results produced by the discovery searches.

use super::inventory::{Datacenter, VmRecord};

/// How a node identifier is matched against VM inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindVm {
    ByUuid,
    ByName,
    ByIp,
}

impl std::fmt::Display for FindVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FindVm::ByUuid => "uuid",
            FindVm::ByName => "name",
            FindVm::ByIp => "ip",
        };
        f.write_str(label)
    }
}

/// Where a node's VM was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDiscoveryInfo {
    pub tenant_ref: String,
    /// Address of the endpoint that owns the VM.
    pub ics_server: String,
    pub datacenter: Datacenter,
    pub vm: VmRecord,
    /// Canonical (lower-case) VM UUID.
    pub uuid: String,
    pub node_name: String,
}

/// One reachable endpoint/datacenter pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiscoveryInfo {
    pub tenant_ref: String,
    pub ics_server: String,
    pub datacenter: Datacenter,
}

/// The endpoint/datacenter pair that carries a zone and region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDiscoveryInfo {
    pub tenant_ref: String,
    pub ics_server: String,
    pub datacenter: Datacenter,
}

/// Zone and region names resolved from host tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneRegion {
    pub zone: Option<String>,
    pub region: Option<String>,
}
