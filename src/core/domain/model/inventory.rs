//! Inventory objects returned by an iCenter endpoint.
//!
//! These are read-only snapshots; the provider never writes them back.

use serde::{Deserialize, Serialize};

/// A named partition of VM inventory within one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Datacenter {
    /// Identifier used in inventory API paths.
    pub id: String,
    /// Display name (what the allow-list and the index use).
    pub name: String,
    /// Address of the owning endpoint, filled in by the session.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
}

impl Datacenter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// One IP-capable NIC of a VM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkInterface {
    /// Name of the port group / network the NIC is attached to.
    #[serde(rename = "name")]
    pub network_name: String,
    #[serde(rename = "ip", default)]
    pub ip_address: String,
}

/// A virtual machine as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRecord {
    pub uuid: String,
    /// Display name, which doubles as the guest host name.
    pub name: String,
    #[serde(default)]
    pub nics: Vec<NetworkInterface>,
    #[serde(default)]
    pub cpu_num: u32,
    /// Memory size in MiB.
    #[serde(default, rename = "memory")]
    pub memory_mb: u64,
    #[serde(default, rename = "guestosLabel")]
    pub guest_os_label: String,
    /// Host system currently running the VM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

/// A hypervisor host inside a datacenter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSystem {
    pub id: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default, rename = "dataCenterId")]
    pub datacenter_id: String,
    #[serde(default)]
    pub cluster_id: String,
}

/// A tag attached to a host, its cluster or its datacenter.
///
/// The description carries the category (zone or region label) and the
/// name carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
