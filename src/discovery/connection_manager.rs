//! Pool of endpoint sessions with serialized (re)authentication.

use crate::{
    auth::application::service::credential_service::CredentialManager,
    core::{
        domain::{
            error::{IcsError, IcsResult},
            model::{
                cloud_config::DiscoveryConfig, endpoint_config::EndpointConfig,
                inventory::Datacenter,
            },
        },
        infrastructure::session::{EndpointSession, SessionFactory},
    },
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// One configured tenant and its session.
pub struct EndpointConnection {
    config: EndpointConfig,
    session: Arc<dyn EndpointSession>,
}

impl EndpointConnection {
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn EndpointSession> {
        &self.session
    }

    /// Endpoint address as used in discovery results.
    pub fn server(&self) -> &str {
        self.config.host().as_str()
    }
}

impl std::fmt::Debug for EndpointConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConnection")
            .field("tenant_ref", &self.config.tenant_ref())
            .field("server", &self.server())
            .finish()
    }
}

/// Datacenters resolved for one endpoint, plus the lookups that failed.
#[derive(Debug, Default)]
pub(crate) struct DatacenterScan {
    pub found: Vec<Datacenter>,
    pub errors: Vec<IcsError>,
}

/// Owns one [`EndpointConnection`] per tenant.
///
/// Cloning is cheap and every clone shares the same sessions and the same
/// connect lock.
#[derive(Clone)]
pub struct ConnectionManager {
    endpoints: Arc<BTreeMap<String, Arc<EndpointConnection>>>,
    credential_managers: Arc<HashMap<String, Arc<dyn CredentialManager>>>,
    /// Serializes every connect attempt across all tenants.
    connect_lock: Arc<Mutex<()>>,
    discovery: DiscoveryConfig,
}

impl ConnectionManager {
    /// Creates a session for every endpoint.
    ///
    /// # Errors
    /// `InvalidConfiguration` for a duplicate tenant reference, or whatever
    /// the factory reports.
    pub fn new(
        endpoints: Vec<EndpointConfig>,
        factory: &dyn SessionFactory,
        credential_managers: HashMap<String, Arc<dyn CredentialManager>>,
        discovery: DiscoveryConfig,
    ) -> IcsResult<Self> {
        let mut map = BTreeMap::new();
        for config in endpoints {
            let tenant_ref = config.tenant_ref().to_string();
            if map.contains_key(&tenant_ref) {
                return Err(IcsError::InvalidConfiguration(format!(
                    "duplicate tenant reference: {}",
                    tenant_ref
                )));
            }
            let session = factory.create(&config)?;
            map.insert(tenant_ref, Arc::new(EndpointConnection { config, session }));
        }

        Ok(Self {
            endpoints: Arc::new(map),
            credential_managers: Arc::new(credential_managers),
            connect_lock: Arc::new(Mutex::new(())),
            discovery,
        })
    }

    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    /// All connections in tenant order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<EndpointConnection>> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Looks up a connection by tenant reference.
    pub fn endpoint(&self, tenant_ref: &str) -> IcsResult<Arc<EndpointConnection>> {
        self.endpoints
            .get(tenant_ref)
            .cloned()
            .ok_or_else(|| IcsError::EndpointNotFound(tenant_ref.to_string()))
    }

    /// Connects the tenant's session, refreshing credentials once if the
    /// endpoint rejects the cached ones.
    #[instrument(skip(self))]
    pub async fn connect(&self, tenant_ref: &str) -> IcsResult<()> {
        let connection = self.endpoint(tenant_ref)?;
        self.connect_endpoint(&connection).await
    }

    pub(crate) async fn connect_endpoint(&self, connection: &EndpointConnection) -> IcsResult<()> {
        let _guard = self.connect_lock.lock().await;
        let session = connection.session();

        let err = match session.connect().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !err.is_invalid_credentials() {
            error!(server = connection.server(), error = %err, "Cannot connect to iCenter");
            return Err(err);
        }

        let secret_ref = connection.config().secret_ref();
        let Some(manager) = self.credential_managers.get(secret_ref) else {
            error!(
                server = connection.server(),
                secret_ref, "Unable to find credential manager"
            );
            return Err(IcsError::CredentialManagerNotFound(secret_ref.to_string()));
        };

        info!(
            server = connection.server(),
            secret_ref, "Invalid credentials, fetching credentials from secrets"
        );
        let credentials = manager.get_credential(connection.server()).await?;
        session.update_credentials(credentials).await;
        session.connect().await
    }

    /// Connects with the configured attempt count and delay.
    ///
    /// Only transient `Connection` errors are retried; there is no delay
    /// after the final attempt.
    pub(crate) async fn connect_with_retry(&self, connection: &EndpointConnection) -> IcsResult<()> {
        let attempts = self.discovery.connection_attempts.max(1);
        let delay = Duration::from_millis(self.discovery.retry_delay_ms);
        let mut attempt = 1;
        loop {
            match self.connect_endpoint(connection).await {
                Ok(()) => return Ok(()),
                Err(err @ IcsError::Connection(_)) if attempt < attempts => {
                    debug!(
                        server = connection.server(),
                        attempt,
                        error = %err,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolves the datacenters to search on a connected endpoint: all of
    /// them, or the configured allow-list.
    pub(crate) async fn scan_datacenters(&self, connection: &EndpointConnection) -> DatacenterScan {
        let mut scan = DatacenterScan::default();
        let session = connection.session();
        let allow_list = connection.config().datacenters();

        if allow_list.is_empty() {
            match session.list_datacenters().await {
                Ok(found) => scan.found = found,
                Err(err) => scan.errors.push(err),
            }
            return scan;
        }

        for name in allow_list {
            match session.get_datacenter(name).await {
                Ok(datacenter) => scan.found.push(datacenter),
                Err(err) => {
                    warn!(server = connection.server(), datacenter = %name, error = %err, "Datacenter lookup failed");
                    scan.errors.push(err);
                }
            }
        }
        scan
    }

    /// Closes every live session. Failures are logged, never returned.
    pub async fn logout(&self) {
        for connection in self.endpoints.values() {
            let session = connection.session();
            if !session.is_connected().await {
                continue;
            }
            match session.logout().await {
                Ok(()) => debug!(server = connection.server(), "Logged out"),
                Err(err) => error!(server = connection.server(), error = %err, "Logout failed"),
            }
        }
    }

    /// Connects every endpoint; the first failure is returned.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> IcsResult<()> {
        for connection in self.endpoints.values() {
            match self.connect_endpoint(connection).await {
                Ok(()) => debug!(server = connection.server(), "iCenter connect succeeded"),
                Err(err) => {
                    error!(server = connection.server(), error = %err, "iCenter verification failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("credential_managers", &self.credential_managers.keys().collect::<Vec<_>>())
            .field("discovery", &self.discovery)
            .finish()
    }
}
