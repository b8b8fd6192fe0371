//! In-memory index of resolved nodes: endpoint → datacenter → UUID, plus
//! flat lookups by name and by UUID.

use crate::core::domain::{
    error::{IcsError, IcsResult},
    model::node_info::NodeInfo,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct DatacenterEntry {
    nodes: BTreeMap<String, Arc<NodeInfo>>,
}

#[derive(Debug, Default)]
struct EndpointEntry {
    datacenters: BTreeMap<String, DatacenterEntry>,
}

/// Every entry is keyed by the canonical UUID. Nodes are never dropped; a
/// UUID inserted again replaces its previous entry wherever it was.
#[derive(Debug, Default)]
pub(crate) struct NodeIndex {
    endpoints: BTreeMap<String, EndpointEntry>,
    by_name: HashMap<String, Arc<NodeInfo>>,
    by_uuid: HashMap<String, Arc<NodeInfo>>,
}

impl NodeIndex {
    /// Inserts `info`, replacing any entry for the same UUID or name.
    pub fn insert(&mut self, info: Arc<NodeInfo>) {
        if let Some(previous) = self.by_uuid.get(&info.uuid).cloned() {
            self.remove_location(&previous);
            if previous.node_name != info.node_name
                && self
                    .by_name
                    .get(&previous.node_name)
                    .is_some_and(|named| named.uuid == previous.uuid)
            {
                self.by_name.remove(&previous.node_name);
            }
        }

        self.by_name.insert(info.node_name.clone(), Arc::clone(&info));
        self.by_uuid.insert(info.uuid.clone(), Arc::clone(&info));
        self.endpoints
            .entry(info.ics_server.clone())
            .or_default()
            .datacenters
            .entry(info.datacenter.name.clone())
            .or_default()
            .nodes
            .insert(info.uuid.clone(), info);
    }

    fn remove_location(&mut self, info: &NodeInfo) {
        let Some(endpoint) = self.endpoints.get_mut(&info.ics_server) else {
            return;
        };
        if let Some(datacenter) = endpoint.datacenters.get_mut(&info.datacenter.name) {
            datacenter.nodes.remove(&info.uuid);
            if datacenter.nodes.is_empty() {
                endpoint.datacenters.remove(&info.datacenter.name);
            }
        }
        if endpoint.datacenters.is_empty() {
            self.endpoints.remove(&info.ics_server);
        }
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<&Arc<NodeInfo>> {
        self.by_uuid.get(uuid)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<NodeInfo>> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    /// Nodes under the given endpoint and datacenter filters.
    ///
    /// An empty endpoint selects everything and the datacenter filter is then
    /// ignored.
    ///
    /// # Errors
    /// `EndpointNotFound` or `DatacenterNotFound` when a filter names
    /// something never indexed.
    pub fn select(&self, endpoint: &str, datacenter: &str) -> IcsResult<Vec<&Arc<NodeInfo>>> {
        if endpoint.is_empty() {
            return Ok(self
                .endpoints
                .values()
                .flat_map(|e| e.datacenters.values())
                .flat_map(|dc| dc.nodes.values())
                .collect());
        }

        let entry = self
            .endpoints
            .get(endpoint)
            .ok_or_else(|| IcsError::EndpointNotFound(endpoint.to_string()))?;
        if datacenter.is_empty() {
            return Ok(entry
                .datacenters
                .values()
                .flat_map(|dc| dc.nodes.values())
                .collect());
        }

        let dc = entry
            .datacenters
            .get(datacenter)
            .ok_or_else(|| IcsError::DatacenterNotFound(datacenter.to_string()))?;
        Ok(dc.nodes.values().collect())
    }
}
