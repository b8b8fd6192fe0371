//! The search capability consumed by discovery: one authenticated session
//! per endpoint plus the inventory lookups it can perform.

use crate::core::{
    domain::{
        error::IcsResult,
        model::{
            cloud_config::RateLimitConfig,
            endpoint_config::EndpointConfig,
            inventory::{Datacenter, HostSystem, Tag, VmRecord},
        },
        value_object::Credentials,
    },
    infrastructure::api_client::ApiClient,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A session with one iCenter tenant.
///
/// Implementations reconnect lazily: `connect` is cheap when a live session
/// is already held.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EndpointSession: Send + Sync {
    /// Ensures a live session, logging in with the stored credentials if needed.
    async fn connect(&self) -> IcsResult<()>;

    /// Closes the session if one is live.
    async fn logout(&self) -> IcsResult<()>;

    async fn is_connected(&self) -> bool;

    /// Replaces the stored credentials; the next `connect` uses them.
    async fn update_credentials(&self, credentials: Credentials);

    async fn list_datacenters(&self) -> IcsResult<Vec<Datacenter>>;

    /// Looks up a datacenter by name. Missing is `DatacenterNotFound`.
    async fn get_datacenter(&self, name: &str) -> IcsResult<Datacenter>;

    /// Missing is `VmNotFound`; the same holds for the name and IP variants.
    async fn find_vm_by_uuid(&self, datacenter: &Datacenter, uuid: &str) -> IcsResult<VmRecord>;

    async fn find_vm_by_name(&self, datacenter: &Datacenter, name: &str) -> IcsResult<VmRecord>;

    async fn find_vm_by_ip(&self, datacenter: &Datacenter, ip: &str) -> IcsResult<VmRecord>;

    async fn list_hosts(&self, datacenter: &Datacenter) -> IcsResult<Vec<HostSystem>>;

    /// Tags attached to a host, its cluster and its datacenter.
    async fn host_tags(&self, host_id: &str) -> IcsResult<Vec<Tag>>;
}

/// Builds one session per configured endpoint.
pub trait SessionFactory: Send + Sync {
    fn create(&self, config: &EndpointConfig) -> IcsResult<Arc<dyn EndpointSession>>;
}

/// Settings shared by every HTTP session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub session_lifetime: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(
                crate::core::domain::model::cloud_config::DEFAULT_SESSION_LIFETIME_SECS,
            ),
            rate_limit: None,
        }
    }
}

/// Creates [`ApiClient`] sessions.
#[derive(Debug, Clone, Default)]
pub struct HttpSessionFactory {
    settings: SessionSettings,
}

impl HttpSessionFactory {
    pub fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn create(&self, config: &EndpointConfig) -> IcsResult<Arc<dyn EndpointSession>> {
        Ok(Arc::new(ApiClient::new(config, self.settings)?))
    }
}
