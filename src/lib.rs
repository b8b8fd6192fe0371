mod auth;
mod core;
pub mod discovery;
pub mod node;

pub use crate::auth::application::service::credential_service::{
    CredentialManager, SecretsDirectoryCredentialManager, StaticCredentialManager,
};
pub use crate::core::domain::error::{IcsError, IcsResult, ValidationError};
pub use crate::core::domain::model::{
    cloud_config::{
        CloudConfig, DiscoveryConfig, GlobalConfig, ICenterConfig, LabelsConfig, NodesConfig,
        RateLimitConfig,
    },
    discovery::{FindVm, ListDiscoveryInfo, VmDiscoveryInfo, ZoneDiscoveryInfo, ZoneRegion},
    endpoint_config::{EndpointConfig, GLOBAL_SECRET_REF},
    inventory::{Datacenter, HostSystem, NetworkInterface, Tag, VmRecord},
    node_info::{InstanceMetadata, NodeAddress, NodeAddressType, NodeInfo, NodeRecord},
};
pub use crate::core::domain::value_object::{Credentials, IpFamily, NodeUuid, PROVIDER_PREFIX};
pub use crate::core::infrastructure::{
    node_watcher::NodeWatcher,
    session::{EndpointSession, HttpSessionFactory, SessionFactory, SessionSettings},
};
use crate::{discovery::ConnectionManager, node::NodeManager};
use k8s_openapi::api::core::v1::Node;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Node discovery for a Kubernetes cluster running on inCloud Sphere.
///
/// The provider owns one session per configured iCenter tenant and an index
/// of the VMs backing cluster nodes. Call [`IcsCloudProvider::shutdown`]
/// before dropping it so every session is logged out.
///
/// # Examples
///
/// ```no_run
/// use ics_cloud_provider::{CloudConfig, IcsCloudProvider, IcsResult};
///
/// #[tokio::main]
/// async fn main() -> IcsResult<()> {
///     let config = CloudConfig::load("/etc/kubernetes/ics.yaml").await?;
///     let provider = IcsCloudProvider::builder().config(config).build()?;
///
///     provider.verify().await?;
///     let nodes = provider.export_nodes("", "").await?;
///     println!("{} registered nodes", nodes.len());
///
///     provider.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct IcsCloudProvider {
    config: CloudConfig,
    nodes: Arc<NodeManager>,
}

/// Builder for [`IcsCloudProvider`].
#[derive(Default)]
pub struct IcsCloudProviderBuilder {
    config: Option<CloudConfig>,
    credential_managers: HashMap<String, Arc<dyn CredentialManager>>,
    session_factory: Option<Arc<dyn SessionFactory>>,
}

impl IcsCloudProviderBuilder {
    pub fn config(mut self, config: CloudConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers the credential source for endpoints whose secret reference
    /// is `secret_ref` (`Global` or `<namespace>/<name>`).
    pub fn credential_manager(
        mut self,
        secret_ref: impl Into<String>,
        manager: Arc<dyn CredentialManager>,
    ) -> Self {
        self.credential_managers.insert(secret_ref.into(), manager);
        self
    }

    /// Replaces the HTTP sessions, mainly for tests.
    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = Some(factory);
        self
    }

    /// Validates the configuration and creates every endpoint session.
    ///
    /// No endpoint is contacted until the first search or [`IcsCloudProvider::verify`].
    ///
    /// # Errors
    /// Returns a validation error when no configuration was given, and
    /// `InvalidConfiguration` for anything the configuration gets wrong.
    pub fn build(self) -> IcsResult<IcsCloudProvider> {
        let config = self.config.ok_or_else(|| IcsError::Validation {
            source: ValidationError::Field {
                field: "config".to_string(),
                message: "Configuration is required".to_string(),
            },
        })?;
        let endpoints = config.resolve_endpoints()?;

        let mut credential_managers = self.credential_managers;
        let secrets_directory = config.global.secrets_directory.trim();
        if !secrets_directory.is_empty() && !credential_managers.contains_key(GLOBAL_SECRET_REF) {
            credential_managers.insert(
                GLOBAL_SECRET_REF.to_string(),
                Arc::new(SecretsDirectoryCredentialManager::new(secrets_directory)),
            );
        }

        let factory: Arc<dyn SessionFactory> = match self.session_factory {
            Some(factory) => factory,
            None => Arc::new(HttpSessionFactory::new(config.session_settings())),
        };
        let connections = ConnectionManager::new(
            endpoints,
            factory.as_ref(),
            credential_managers,
            config.discovery,
        )?;
        let nodes = NodeManager::new(connections, &config.nodes, config.labels.clone())?;
        info!(endpoints = nodes.connections().len(), "inCloud Sphere provider initialized");

        Ok(IcsCloudProvider {
            config,
            nodes: Arc::new(nodes),
        })
    }
}

impl IcsCloudProvider {
    pub fn builder() -> IcsCloudProviderBuilder {
        IcsCloudProviderBuilder::default()
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        self.nodes.connections()
    }

    pub fn node_manager(&self) -> &Arc<NodeManager> {
        &self.nodes
    }

    /// Connects every endpoint; fails on the first endpoint that cannot be reached.
    pub async fn verify(&self) -> IcsResult<()> {
        self.connections().verify().await
    }

    pub async fn register_node(&self, node: &Node) {
        self.nodes.register_node(node).await;
    }

    pub async fn unregister_node(&self, node: &Node) {
        self.nodes.unregister_node(node).await;
    }

    pub async fn discover_node(&self, node_id: &str, search_by: FindVm) -> IcsResult<Arc<NodeInfo>> {
        self.nodes.discover_node(node_id, search_by).await
    }

    pub async fn find_node_info(&self, uuid: &str) -> IcsResult<Arc<NodeInfo>> {
        self.nodes.find_node_info(uuid).await
    }

    pub async fn get_node(&self, uuid: &str) -> IcsResult<NodeRecord> {
        self.nodes.get_node(uuid).await
    }

    /// Registered nodes, optionally narrowed to one endpoint address and
    /// one of its datacenters.
    pub async fn export_nodes(&self, endpoint: &str, datacenter: &str) -> IcsResult<Vec<NodeRecord>> {
        self.nodes.export_nodes(endpoint, datacenter).await
    }

    pub async fn instance_metadata(&self, provider_id: &str) -> IcsResult<InstanceMetadata> {
        self.nodes.instance_metadata(provider_id).await
    }

    pub async fn list_all_pairs(&self) -> Vec<ListDiscoveryInfo> {
        self.connections().list_all_pairs().await
    }

    /// The endpoint and datacenter serving `zone` in `region`, using the
    /// configured tag categories.
    pub async fn zone_discovery(&self, zone: &str, region: &str) -> IcsResult<ZoneDiscoveryInfo> {
        self.connections()
            .which_endpoint_and_dc_by_zone(&self.config.labels, zone, region)
            .await
    }

    /// A watcher that keeps the registered node set in sync with the cluster.
    pub fn node_watcher(&self, client: kube::Client) -> NodeWatcher {
        NodeWatcher::new(Arc::clone(&self.nodes), client)
    }

    /// Logs out of every endpoint. Failures are logged only.
    pub async fn shutdown(&self) {
        info!("Shutting down inCloud Sphere provider");
        self.connections().logout().await;
    }
}

#[cfg(test)]
mod tests;
