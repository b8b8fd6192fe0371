use crate::core::domain::{
    error::{IcsError, IcsResult},
    value_object::{
        Credentials, EndpointHost, EndpointPort, IpFamily, validate_host, validate_port,
    },
};
use url::Url;

/// Secret reference used for credentials shared by every endpoint.
pub const GLOBAL_SECRET_REF: &str = "Global";

/// Resolved, validated settings for one iCenter tenant.
///
/// Built once by the configuration loader and never mutated afterwards;
/// credentials that change at runtime live on the session instead.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    tenant_ref: String,
    host: EndpointHost,
    port: EndpointPort,
    credentials: Credentials,
    secret_ref: String,
    insecure: bool,
    datacenters: Vec<String>,
    ip_families: Vec<IpFamily>,
}

impl EndpointConfig {
    /// Creates a config for `tenant_ref` served at `host:port`.
    ///
    /// # Errors
    /// Returns a validation error for an empty tenant, a malformed host or port 0.
    pub fn new(tenant_ref: impl Into<String>, host: impl Into<String>, port: u16) -> IcsResult<Self> {
        let tenant_ref = tenant_ref.into();
        if tenant_ref.trim().is_empty() {
            return Err(IcsError::InvalidConfiguration(
                "tenant reference cannot be empty".to_string(),
            ));
        }
        let host = host.into();
        validate_host(&host)?;
        validate_port(port)?;

        Ok(Self {
            tenant_ref,
            host: EndpointHost::new_unchecked(host),
            port: EndpointPort::new_unchecked(port),
            credentials: Credentials::default(),
            secret_ref: GLOBAL_SECRET_REF.to_string(),
            insecure: false,
            datacenters: Vec::new(),
            ip_families: vec![IpFamily::Ipv4],
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_secret_ref(mut self, secret_ref: impl Into<String>) -> Self {
        self.secret_ref = secret_ref.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Sets the datacenter allow-list from its comma-separated form.
    ///
    /// Blank entries are dropped; an empty list means every datacenter.
    pub fn with_datacenters(mut self, datacenters: &str) -> Self {
        self.datacenters = datacenters
            .split(',')
            .map(str::trim)
            .filter(|dc| !dc.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_ip_families(mut self, ip_families: Vec<IpFamily>) -> Self {
        if !ip_families.is_empty() {
            self.ip_families = ip_families;
        }
        self
    }

    pub fn tenant_ref(&self) -> &str {
        &self.tenant_ref
    }

    /// The endpoint address (IP or FQDN) used as the index key.
    pub fn host(&self) -> &EndpointHost {
        &self.host
    }

    pub fn port(&self) -> EndpointPort {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn secret_ref(&self) -> &str {
        &self.secret_ref
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        self.insecure
    }

    /// Explicit datacenter allow-list; empty means search all.
    pub fn datacenters(&self) -> &[String] {
        &self.datacenters
    }

    pub fn ip_families(&self) -> &[IpFamily] {
        &self.ip_families
    }

    /// Builds the HTTPS base URL of the endpoint API.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if the host cannot form a URL.
    pub fn base_url(&self) -> IcsResult<Url> {
        let raw = format!("https://{}:{}/", self.host.as_authority(), self.port.get());
        Url::parse(&raw).map_err(|e| {
            IcsError::InvalidConfiguration(format!("invalid endpoint URL '{}': {}", raw, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EndpointConfig::new("tenant-a", "10.0.0.1", 443).unwrap();
        assert_eq!(cfg.tenant_ref(), "tenant-a");
        assert_eq!(cfg.secret_ref(), GLOBAL_SECRET_REF);
        assert!(cfg.datacenters().is_empty());
        assert_eq!(cfg.ip_families(), &[IpFamily::Ipv4]);
        assert!(!cfg.accepts_invalid_certs());
    }

    #[test]
    fn test_datacenter_allow_list_is_trimmed() {
        let cfg = EndpointConfig::new("t", "icenter.local", 443)
            .unwrap()
            .with_datacenters(" DC1, ,DC2 ,");
        assert_eq!(cfg.datacenters(), &["DC1".to_string(), "DC2".to_string()]);
    }

    #[test]
    fn test_base_url() {
        let cfg = EndpointConfig::new("t", "fd01::1", 8443).unwrap();
        assert_eq!(cfg.base_url().unwrap().as_str(), "https://[fd01::1]:8443/");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(EndpointConfig::new("", "10.0.0.1", 443).is_err());
        assert!(EndpointConfig::new("t", "bad host", 443).is_err());
        assert!(EndpointConfig::new("t", "10.0.0.1", 0).is_err());
    }
}
