mod credentials;
mod endpoint_host;
mod endpoint_port;
mod ip_family;
mod node_uuid;
mod session_token;

pub use credentials::Credentials;
pub use endpoint_host::EndpointHost;
pub use endpoint_port::{DEFAULT_ICENTER_PORT, EndpointPort};
pub use ip_family::{IpFamily, ips_from_family, is_local_only};
pub use node_uuid::{NodeUuid, PROVIDER_PREFIX, canonicalize};
pub use session_token::SessionToken;

// Re-export validation functions for internal use
pub(crate) use credentials::{validate_password, validate_username};
pub(crate) use endpoint_host::validate_host;
pub(crate) use endpoint_port::{parse_port, validate_port};
pub(crate) use session_token::validate_token;
