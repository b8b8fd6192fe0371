//! Loading, environment overlay and validation of [`CloudConfig`].

use crate::core::{
    domain::{
        error::{IcsError, IcsResult},
        model::{
            cloud_config::{CloudConfig, DEFAULT_IP_FAMILY, ICenterConfig},
            endpoint_config::{EndpointConfig, GLOBAL_SECRET_REF},
        },
        value_object::{Credentials, DEFAULT_ICENTER_PORT, IpFamily, parse_port},
    },
    infrastructure::session::SessionSettings,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const ENDPOINT_PREFIX: &str = "ICS_ICENTER_";

fn parse_ip_families(value: &str) -> IcsResult<Vec<IpFamily>> {
    let tokens: Vec<&str> = value.split(',').collect();
    IpFamily::parse_priority(&tokens)
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => {
            warn!(key, value, "Ignoring unparseable boolean");
            None
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl CloudConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> IcsResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| IcsError::InvalidConfiguration(format!("invalid cloud config: {}", e)))
    }

    /// Reads a YAML file and overlays the process environment.
    pub async fn load(path: impl AsRef<Path>) -> IcsResult<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            IcsError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut cfg = Self::from_yaml(&yaml)?;
        cfg.apply_env(std::env::vars())?;
        Ok(cfg)
    }

    /// Builds a configuration from the process environment alone.
    pub fn from_env() -> IcsResult<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(std::env::vars())?;
        Ok(cfg)
    }

    /// Overlays `ICS_*` variables. Environment values win over file values.
    ///
    /// # Errors
    /// Returns a validation error for a malformed port.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> IcsResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();

        let global = &mut self.global;
        if let Some(v) = get("ICS_ICENTER") {
            global.server = v;
        }
        if let Some(v) = get("ICS_ICENTER_PORT") {
            global.port = Some(parse_port(&v)?);
        }
        if let Some(v) = get("ICS_USER") {
            global.user = v;
        }
        if let Some(v) = get("ICS_PASSWORD") {
            global.password = v;
        }
        if let Some(v) = get("ICS_DATACENTER") {
            global.datacenters = v;
        }
        if let Some(v) = get("ICS_SECRET_NAME") {
            global.secret_name = v;
        }
        if let Some(v) = get("ICS_SECRET_NAMESPACE") {
            global.secret_namespace = v;
        }
        if let Some(flag) = get("ICS_INSECURE").and_then(|v| parse_flag("ICS_INSECURE", &v)) {
            global.insecure_flag = flag;
        }
        if let Some(flag) = get("ICS_API_DISABLE").and_then(|v| parse_flag("ICS_API_DISABLE", &v))
        {
            global.api_disable = flag;
        }
        if let Some(v) = get("ICS_API_BINDING") {
            global.api_binding = v;
        }
        if let Some(v) = get("ICS_SECRETS_DIRECTORY") {
            global.secrets_directory = v;
        }
        if let Some(v) = get("ICS_IP_FAMILY") {
            global.ip_family = v;
        }
        if let Some(v) = get("ICS_LABEL_REGION") {
            self.labels.region = v;
        }
        if let Some(v) = get("ICS_LABEL_ZONE") {
            self.labels.zone = v;
        }

        for (key, tenant) in &env {
            let Some(id) = key.strip_prefix(ENDPOINT_PREFIX) else {
                continue;
            };
            if id.is_empty() || id == "PORT" || tenant.is_empty() {
                continue;
            }
            let field = |name: &str| get(&format!("ICENTER_{}_{}", id, name));

            let port = match field("PORT") {
                Some(v) => Some(parse_port(&v)?),
                None => self.global.port,
            };
            let (secret_name, secret_namespace) =
                match (field("SECRET_NAME"), field("SECRET_NAMESPACE")) {
                    (Some(name), Some(namespace)) => (name, namespace),
                    _ => (String::new(), String::new()),
                };

            let icenter = ICenterConfig {
                user: field("USERNAME").unwrap_or_else(|| self.global.user.clone()),
                password: field("PASSWORD").unwrap_or_else(|| self.global.password.clone()),
                server: field("SERVER").unwrap_or_default(),
                port,
                insecure_flag: field("INSECURE")
                    .and_then(|v| parse_flag("INSECURE", &v))
                    .unwrap_or(false),
                datacenters: field("DATACENTERS")
                    .unwrap_or_else(|| self.global.datacenters.clone()),
                secret_name,
                secret_namespace,
                ip_family: field("IP_FAMILY").unwrap_or_else(|| self.global.ip_family.clone()),
            };
            debug!(tenant_ref = %tenant, "Endpoint configured from environment");
            self.icenters.insert(tenant.clone(), icenter);
        }

        Ok(())
    }

    /// Settings for every HTTP session.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            session_lifetime: Duration::from_secs(self.global.session_lifetime_secs),
            rate_limit: self.global.rate_limit,
        }
    }

    fn validate_discovery(&self) -> IcsResult<()> {
        let discovery = &self.discovery;
        if discovery.pool_size == 0 || discovery.queue_size == 0 {
            return Err(IcsError::InvalidConfiguration(
                "discovery pool-size and queue-size must be > 0".to_string(),
            ));
        }
        if discovery.connection_attempts == 0 {
            return Err(IcsError::InvalidConfiguration(
                "discovery connection-attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates the configuration and produces one [`EndpointConfig`] per tenant.
    ///
    /// # Errors
    /// `InvalidConfiguration` for a missing endpoint, missing credentials or
    /// an unknown IP family; validation errors for bad hosts or ports.
    pub fn resolve_endpoints(&self) -> IcsResult<Vec<EndpointConfig>> {
        self.validate_discovery()?;

        let global = &self.global;
        let global_ip_family = non_empty_or(&global.ip_family, DEFAULT_IP_FAMILY);
        parse_ip_families(&global_ip_family)?;

        let mut icenters = self.icenters.clone();
        if !global.server.is_empty() && !icenters.contains_key(&global.server) {
            icenters.insert(
                global.server.clone(),
                ICenterConfig {
                    user: global.user.clone(),
                    password: global.password.clone(),
                    server: global.server.clone(),
                    port: global.port,
                    insecure_flag: global.insecure_flag,
                    datacenters: global.datacenters.clone(),
                    ip_family: global_ip_family.clone(),
                    ..Default::default()
                },
            );
        }

        if icenters.is_empty() {
            return Err(IcsError::InvalidConfiguration(
                "no iCenter servers were configured".to_string(),
            ));
        }

        let global_secret = global.is_secret_info_provided();
        let mut endpoints = Vec::with_capacity(icenters.len());
        for (tenant_ref, icenter) in &icenters {
            if tenant_ref.trim().is_empty() {
                return Err(IcsError::InvalidConfiguration(
                    "iCenter section with an empty name".to_string(),
                ));
            }
            let server = non_empty_or(&icenter.server, tenant_ref);

            let mut credentials = Credentials::new(icenter.user.clone(), icenter.password.clone());
            let mut secret_ref = GLOBAL_SECRET_REF.to_string();
            if icenter.is_secret_info_provided() {
                secret_ref = format!("{}/{}", icenter.secret_namespace, icenter.secret_name);
            } else if !global_secret {
                let user = non_empty_or(&icenter.user, &global.user);
                if user.is_empty() {
                    return Err(IcsError::InvalidConfiguration(format!(
                        "username is missing for iCenter {}",
                        tenant_ref
                    )));
                }
                let password = non_empty_or(&icenter.password, &global.password);
                if password.is_empty() {
                    return Err(IcsError::InvalidConfiguration(format!(
                        "password is missing for iCenter {}",
                        tenant_ref
                    )));
                }
                credentials = Credentials::new(user, password);
            }

            let port = icenter
                .port
                .or(global.port)
                .unwrap_or(DEFAULT_ICENTER_PORT);
            let datacenters = non_empty_or(&icenter.datacenters, &global.datacenters);
            let ip_families =
                parse_ip_families(&non_empty_or(&icenter.ip_family, &global_ip_family))?;

            let endpoint = EndpointConfig::new(tenant_ref.clone(), server, port)?
                .with_credentials(credentials)
                .with_secret_ref(secret_ref)
                .with_insecure(icenter.insecure_flag || global.insecure_flag)
                .with_datacenters(&datacenters)
                .with_ip_families(ip_families);
            debug!(tenant_ref = %tenant_ref, server = %endpoint.host(), "Resolved endpoint");
            endpoints.push(endpoint);
        }

        Ok(endpoints)
    }
}
