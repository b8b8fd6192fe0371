//! HTTP session with an iCenter endpoint: lazy login, one-shot re-login on
//! `401 Unauthorized`, optional rate limiting and inventory lookups.
//!
//! Logins are single-flight: concurrent callers that find the session gone
//! wait for one login instead of each starting their own.

use crate::{
    auth::application::service::login_service::{AUTH_HEADER, LoginService},
    core::{
        domain::{
            error::{IcsError, IcsResult},
            model::{
                endpoint_config::EndpointConfig,
                inventory::{Datacenter, HostSystem, Tag, VmRecord},
                session_auth::SessionAuth,
            },
            value_object::Credentials,
        },
        infrastructure::session::{EndpointSession, SessionSettings},
    },
};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

const API_ROOT: &str = "api/v1/";

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Session with one endpoint.
///
/// Every request carries the session token in the `Authorization` header.
/// If a request receives a `401 Unauthorized` response, the client logs in
/// again once with the stored credentials and retries the request.
pub struct ApiClient {
    http_client: Client,
    base_url: Url,
    endpoint: String,
    credentials: RwLock<Credentials>,
    auth: RwLock<Option<SessionAuth>>,
    login_lock: Mutex<()>,
    session_lifetime: Duration,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    login_service: LoginService,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("endpoint", &self.endpoint)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Creates a new `ApiClient`. The client starts unauthenticated.
    ///
    /// # Errors
    /// Returns `IcsError::Connection` if the HTTP client cannot be built and
    /// `InvalidConfiguration` for a zero rate limit.
    pub fn new(config: &EndpointConfig, settings: SessionSettings) -> IcsResult<Self> {
        Self::with_base_url(config, settings, config.base_url()?)
    }

    pub(crate) fn with_base_url(
        config: &EndpointConfig,
        settings: SessionSettings,
        base_url: Url,
    ) -> IcsResult<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.accepts_invalid_certs())
            .build()
            .map_err(|e| IcsError::Connection(e.to_string()))?;

        let rate_limiter = match settings.rate_limit {
            Some(rl) => {
                let per_second = NonZeroU32::new(rl.requests_per_second).ok_or_else(|| {
                    IcsError::InvalidConfiguration("requests-per-second must be > 0".to_string())
                })?;
                let burst = NonZeroU32::new(rl.burst_size).ok_or_else(|| {
                    IcsError::InvalidConfiguration("burst-size must be > 0".to_string())
                })?;
                let quota = Quota::per_second(per_second).allow_burst(burst);
                Some(Arc::new(DefaultDirectRateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            http_client,
            base_url,
            endpoint: config.host().to_string(),
            credentials: RwLock::new(config.credentials().clone()),
            auth: RwLock::new(None),
            login_lock: Mutex::new(()),
            session_lifetime: settings.session_lifetime,
            rate_limiter,
            login_service: LoginService::new(),
        })
    }

    /// Returns the current authentication state, if any.
    pub async fn auth(&self) -> Option<SessionAuth> {
        self.auth.read().await.clone()
    }

    /// Performs a fresh login using the stored credentials.
    ///
    /// Callers hold `login_lock`. A failed login drops the old session so the
    /// next `connect` does not report a dead token as live.
    async fn refresh_auth(&self) -> IcsResult<()> {
        let credentials = self.credentials.read().await.clone();
        let result = self
            .login_service
            .execute(&self.http_client, &self.base_url, &credentials)
            .await;
        let mut lock = self.auth.write().await;
        match result {
            Ok(auth) => {
                *lock = Some(auth);
                Ok(())
            }
            Err(err) => {
                *lock = None;
                Err(err)
            }
        }
    }

    /// Logs in unless a live session exists.
    async fn ensure_session(&self) -> IcsResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        let _guard = self.login_lock.lock().await;
        if self.is_connected().await {
            return Ok(());
        }
        self.refresh_auth().await
    }

    /// Replaces the session after the endpoint rejected `rejected`, unless
    /// another caller already did.
    async fn relogin(&self, rejected: Option<&str>) -> IcsResult<()> {
        let _guard = self.login_lock.lock().await;
        let current = self.current_token().await;
        if current.is_some() && current.as_deref() != rejected {
            return Ok(());
        }
        self.refresh_auth().await
    }

    async fn current_token(&self) -> Option<String> {
        self.auth
            .read()
            .await
            .as_ref()
            .map(|auth| auth.token().as_str().to_string())
    }

    fn url(&self, path: &str) -> IcsResult<Url> {
        self.base_url
            .join(API_ROOT)
            .and_then(|root| root.join(path.trim_start_matches('/')))
            .map_err(|e| IcsError::InvalidConfiguration(format!("invalid URL: {}", e)))
    }

    async fn send_get(
        &self,
        url: &Url,
        query: &[(&str, &str)],
        token: Option<&str>,
    ) -> IcsResult<reqwest::Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut url = url.clone();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let mut req_builder = self.http_client.get(url);
        if let Some(token) = token {
            req_builder = req_builder.header(AUTH_HEADER, token);
        }

        req_builder
            .send()
            .await
            .map_err(|e| IcsError::Connection(format!("HTTP request failed: {}", e)))
    }

    /// Authenticated GET returning the `data` member of the response.
    ///
    /// `Ok(None)` means the endpoint answered `404 Not Found`.
    async fn get_data<T>(&self, path: &str, query: &[(&str, &str)]) -> IcsResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.ensure_session().await?;
        let url = self.url(path)?;

        let token = self.current_token().await;
        let mut response = self.send_get(&url, query, token.as_deref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(endpoint = %self.endpoint, "Session rejected, logging in again");
            self.relogin(token.as_deref()).await?;
            let token = self.current_token().await;
            response = self.send_get(&url, query, token.as_deref()).await?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(IcsError::InvalidCredentials(format!(
                "session rejected by {} after re-login",
                self.endpoint
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(IcsError::Connection(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map(|envelope| Some(envelope.data))
            .map_err(|e| IcsError::Connection(format!("Failed to parse response: {}", e)))
    }

    async fn find_vm(&self, datacenter: &Datacenter, key: &str, value: &str) -> IcsResult<VmRecord> {
        let path = format!("datacenters/{}/vms", datacenter.id);
        let vms: Vec<VmRecord> = self
            .get_data(&path, &[(key, value)])
            .await?
            .unwrap_or_default();
        vms.into_iter().next().ok_or_else(|| {
            IcsError::VmNotFound(format!("{}={} in datacenter {}", key, value, datacenter.name))
        })
    }
}

#[async_trait]
impl EndpointSession for ApiClient {
    async fn connect(&self) -> IcsResult<()> {
        self.ensure_session().await
    }

    async fn logout(&self) -> IcsResult<()> {
        let auth = self.auth.write().await.take();
        match auth {
            Some(auth) => {
                self.login_service
                    .logout(&self.http_client, &self.base_url, &auth)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Returns `true` if there is a valid (non-expired) session token.
    async fn is_connected(&self) -> bool {
        let lock = self.auth.read().await;
        lock.as_ref()
            .map(|a| a.is_live(self.session_lifetime))
            .unwrap_or(false)
    }

    async fn update_credentials(&self, credentials: Credentials) {
        let mut lock = self.credentials.write().await;
        *lock = credentials;
    }

    async fn list_datacenters(&self) -> IcsResult<Vec<Datacenter>> {
        let mut datacenters: Vec<Datacenter> =
            self.get_data("datacenters", &[]).await?.unwrap_or_default();
        for datacenter in &mut datacenters {
            datacenter.endpoint = self.endpoint.clone();
        }
        Ok(datacenters)
    }

    async fn get_datacenter(&self, name: &str) -> IcsResult<Datacenter> {
        self.list_datacenters()
            .await?
            .into_iter()
            .find(|dc| dc.name == name || dc.id == name)
            .ok_or_else(|| {
                IcsError::DatacenterNotFound(format!("{} on {}", name, self.endpoint))
            })
    }

    async fn find_vm_by_uuid(&self, datacenter: &Datacenter, uuid: &str) -> IcsResult<VmRecord> {
        self.find_vm(datacenter, "uuid", uuid).await
    }

    async fn find_vm_by_name(&self, datacenter: &Datacenter, name: &str) -> IcsResult<VmRecord> {
        self.find_vm(datacenter, "name", &name.trim().to_lowercase())
            .await
    }

    async fn find_vm_by_ip(&self, datacenter: &Datacenter, ip: &str) -> IcsResult<VmRecord> {
        self.find_vm(datacenter, "ip", &ip.trim().to_lowercase()).await
    }

    async fn list_hosts(&self, datacenter: &Datacenter) -> IcsResult<Vec<HostSystem>> {
        let path = format!("datacenters/{}/hosts", datacenter.id);
        Ok(self.get_data(&path, &[]).await?.unwrap_or_default())
    }

    async fn host_tags(&self, host_id: &str) -> IcsResult<Vec<Tag>> {
        let host: HostSystem = self
            .get_data(&format!("hosts/{}", host_id), &[])
            .await?
            .ok_or_else(|| IcsError::ZoneRegionNotFound(format!("host {} not found", host_id)))?;

        let targets = [
            ("HOST", host.id.as_str()),
            ("CLUSTER", host.cluster_id.as_str()),
            ("DATACENTER", host.datacenter_id.as_str()),
        ];

        let mut tags = Vec::new();
        for (target_type, target_id) in targets {
            if target_id.is_empty() {
                continue;
            }
            let attached: Option<Vec<Tag>> = self
                .get_data(
                    "tags",
                    &[("targetType", target_type), ("targetId", target_id)],
                )
                .await?;
            match attached {
                Some(attached) => tags.extend(attached),
                None => warn!(target_type, target_id, "Tag listing returned 404"),
            }
        }
        Ok(tags)
    }
}
