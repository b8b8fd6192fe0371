use super::{
    address_policy::{AddressPolicy, instance_type},
    index::NodeIndex,
};
use crate::{
    core::domain::{
        error::{IcsError, IcsResult},
        model::{
            cloud_config::{LabelsConfig, NodesConfig},
            discovery::FindVm,
            node_info::{InstanceMetadata, NodeInfo, NodeRecord},
        },
        value_object::{IpFamily, NodeUuid, canonicalize},
    },
    discovery::ConnectionManager,
};
use k8s_openapi::api::core::v1::Node;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// System UUID reported by the kubelet.
pub(crate) fn system_uuid(node: &Node) -> Option<&str> {
    node.status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .map(|info| info.system_uuid.as_str())
        .filter(|uuid| !uuid.trim().is_empty())
}

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

/// Tracks Kubernetes nodes and the VMs backing them.
///
/// Lock order is always `index` then `registered`.
pub struct NodeManager {
    connections: ConnectionManager,
    policy: AddressPolicy,
    labels: LabelsConfig,
    index: RwLock<NodeIndex>,
    /// Canonical UUID → node, for nodes currently in the cluster.
    registered: RwLock<HashMap<String, Node>>,
}

impl NodeManager {
    /// # Errors
    /// `InvalidConfiguration` for a malformed subnet CIDR.
    pub fn new(
        connections: ConnectionManager,
        nodes: &NodesConfig,
        labels: LabelsConfig,
    ) -> IcsResult<Self> {
        Ok(Self {
            connections,
            policy: AddressPolicy::from_config(nodes)?,
            labels,
            index: RwLock::new(NodeIndex::default()),
            registered: RwLock::new(HashMap::new()),
        })
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Handles a node joining the cluster.
    ///
    /// The node is marked registered even when its VM cannot be resolved.
    #[instrument(skip_all, fields(node = node_name(node)))]
    pub async fn register_node(&self, node: &Node) {
        let Some(raw_uuid) = system_uuid(node) else {
            warn!("Node reports no system UUID, skipping registration");
            return;
        };
        let uuid = canonicalize(raw_uuid);

        if let Err(err) = self.discover_node(&uuid, FindVm::ByUuid).await {
            warn!(uuid = %uuid, error = %err, "Unable to resolve VM for node");
        }

        debug!(uuid = %uuid, "Registering node");
        self.registered.write().await.insert(uuid, node.clone());
    }

    /// Handles a node leaving the cluster. Its resolved VM stays indexed.
    #[instrument(skip_all, fields(node = node_name(node)))]
    pub async fn unregister_node(&self, node: &Node) {
        let Some(raw_uuid) = system_uuid(node) else {
            warn!("Node reports no system UUID, nothing to unregister");
            return;
        };
        let uuid = canonicalize(raw_uuid);
        debug!(uuid = %uuid, "Unregistering node");
        self.registered.write().await.remove(&uuid);
    }

    /// Replaces the registered set with `nodes`, as after a full relist.
    ///
    /// Registered nodes missing from `nodes` are unregistered; listed nodes
    /// not yet registered are registered.
    #[instrument(skip_all, fields(count = nodes.len()))]
    pub async fn sync_registered(&self, nodes: &[Node]) {
        let listed: HashSet<String> = nodes
            .iter()
            .filter_map(system_uuid)
            .map(canonicalize)
            .collect();

        let stale: Vec<Node> = self
            .registered
            .read()
            .await
            .iter()
            .filter(|(uuid, _)| !listed.contains(*uuid))
            .map(|(_, node)| node.clone())
            .collect();
        for node in &stale {
            info!(node = node_name(node), "Node vanished while unwatched, unregistering");
            self.unregister_node(node).await;
        }

        for node in nodes {
            let known = match system_uuid(node) {
                Some(uuid) => self.is_registered(uuid).await,
                None => false,
            };
            if !known {
                self.register_node(node).await;
            }
        }
    }

    pub async fn is_registered(&self, uuid: &str) -> bool {
        self.registered.read().await.contains_key(&canonicalize(uuid))
    }

    /// Resolves `node_id` to a VM and indexes the result.
    #[instrument(skip(self))]
    pub async fn discover_node(&self, node_id: &str, search_by: FindVm) -> IcsResult<Arc<NodeInfo>> {
        let found = self
            .connections
            .which_endpoint_and_dc_by_node_id(node_id, search_by)
            .await?;

        let families = match self.connections.endpoint(&found.tenant_ref) {
            Ok(connection) => connection.config().ip_families().to_vec(),
            Err(_) => {
                warn!(tenant_ref = %found.tenant_ref, "Unknown tenant, defaulting to ipv4");
                vec![IpFamily::Ipv4]
            }
        };
        let addresses = self.policy.select(&found.vm, &families);

        let info = Arc::new(NodeInfo {
            instance_type: instance_type(&found.vm),
            tenant_ref: found.tenant_ref,
            ics_server: found.ics_server,
            datacenter: found.datacenter,
            uuid: found.uuid,
            node_name: found.node_name,
            addresses,
            vm: found.vm,
        });
        info!(
            uuid = %info.uuid,
            node_name = %info.node_name,
            server = %info.ics_server,
            datacenter = %info.datacenter.name,
            "Discovered node"
        );

        self.index.write().await.insert(Arc::clone(&info));
        Ok(info)
    }

    /// Looks up a registered node by UUID in any letter case.
    ///
    /// # Errors
    /// `VmNotFound` when the UUID is not registered or was never resolved.
    pub async fn find_node_info(&self, uuid: &str) -> IcsResult<Arc<NodeInfo>> {
        let uuid = canonicalize(uuid);
        let index = self.index.read().await;
        let registered = self.registered.read().await;
        if !registered.contains_key(&uuid) {
            return Err(IcsError::VmNotFound(format!("node {} is not registered", uuid)));
        }
        index
            .by_uuid(&uuid)
            .cloned()
            .ok_or_else(|| IcsError::VmNotFound(format!("node {} was not discovered", uuid)))
    }

    /// Looks up a registered node by its name.
    pub async fn find_node_info_by_name(&self, name: &str) -> IcsResult<Arc<NodeInfo>> {
        let index = self.index.read().await;
        let registered = self.registered.read().await;
        index
            .by_name(name)
            .filter(|info| registered.contains_key(&info.uuid))
            .cloned()
            .ok_or_else(|| IcsError::VmNotFound(format!("node {}", name)))
    }

    /// The inventory record of one registered node.
    pub async fn get_node(&self, uuid: &str) -> IcsResult<NodeRecord> {
        let info = self.find_node_info(uuid).await?;
        Ok(NodeRecord::from(info.as_ref()))
    }

    /// Records of every registered node under the filters.
    ///
    /// An empty `endpoint` exports everything, whatever `datacenter` says.
    #[instrument(skip(self))]
    pub async fn export_nodes(&self, endpoint: &str, datacenter: &str) -> IcsResult<Vec<NodeRecord>> {
        let index = self.index.read().await;
        let registered = self.registered.read().await;

        let records = index
            .select(endpoint, datacenter)?
            .into_iter()
            .filter(|info| {
                let active = registered.contains_key(&info.uuid);
                if !active {
                    debug!(uuid = %info.uuid, "Node not active, skipping");
                }
                active
            })
            .map(|info| NodeRecord::from(info.as_ref()))
            .collect();
        Ok(records)
    }

    /// What the node controller needs to initialise a node.
    ///
    /// A VM that was never indexed is resolved first. Zone and region are
    /// read from host tags when labels are configured.
    #[instrument(skip(self))]
    pub async fn instance_metadata(&self, provider_id: &str) -> IcsResult<InstanceMetadata> {
        let uuid = NodeUuid::from_provider_id(provider_id)?;
        let cached = self.index.read().await.by_uuid(uuid.as_str()).cloned();
        let info = match cached {
            Some(info) => info,
            None => self.discover_node(uuid.as_str(), FindVm::ByUuid).await?,
        };

        let mut metadata = InstanceMetadata {
            provider_id: uuid.provider_id(),
            instance_type: info.instance_type.clone(),
            node_addresses: info.addresses.iter().map(Into::into).collect(),
            zone: None,
            region: None,
        };

        let wants_zone = !self.labels.zone.is_empty() || !self.labels.region.is_empty();
        if let (true, Some(host_id)) = (wants_zone, info.vm.host_id.as_deref()) {
            let found = self
                .connections
                .lookup_zone_by_host(&info.tenant_ref, host_id, &self.labels.zone, &self.labels.region)
                .await?;
            metadata.zone = found.zone;
            metadata.region = found.region;
        }
        Ok(metadata)
    }

    #[cfg(test)]
    pub(crate) async fn indexed_count(&self) -> usize {
        self.index.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_indexed(&self, uuid: &str) -> bool {
        self.index.read().await.by_uuid(&canonicalize(uuid)).is_some()
    }
}

impl std::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeManager")
            .field("connections", &self.connections)
            .field("policy", &self.policy)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}
