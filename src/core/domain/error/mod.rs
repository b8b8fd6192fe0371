use thiserror::Error;

/// The main error type for inCloud Sphere provider operations.
///
/// This enum represents all possible errors that can occur while connecting
/// to virtualization endpoints, resolving Kubernetes nodes to VMs and
/// serving the resolved inventory.
#[derive(Error, Debug)]
pub enum IcsError {
    /// No configured endpoint (or indexed iCenter) matches the given reference
    #[error("iCenter not found: {0}")]
    EndpointNotFound(String),

    /// The datacenter does not exist on the endpoint or in the node index
    #[error("Datacenter not found: {0}")]
    DatacenterNotFound(String),

    /// No VM matches the identifier
    ///
    /// Inside a fan-out search this is a per-datacenter miss and never an
    /// overall failure; only exhaustion of the whole search surfaces it.
    #[error("No VM found: {0}")]
    VmNotFound(String),

    /// No first-class disk matches the identifier
    #[error("No disk ID/Name found: {0}")]
    DiskNotFound(String),

    /// Unable to find a datacenter carrying the requested zone/region pair
    #[error("Unable to find the Zone/Region pair: {0}")]
    ZoneRegionNotFound(String),

    /// The endpoint's secret reference maps to no registered credential manager
    #[error("Unable to find credential manager for secret reference: {0}")]
    CredentialManagerNotFound(String),

    /// Fatal configuration problems (bad CIDR, unknown IP family, missing endpoint)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transient connection failures; callers retry these
    ///
    /// # Fields
    /// * `0` - A description of what went wrong during the connection attempt
    #[error("Connection error: {0}")]
    Connection(String),

    /// The endpoint rejected the credentials; triggers one credential refresh
    ///
    /// # Fields
    /// * `0` - A description of the authentication failure
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Represents validation failures with detailed context
    ///
    /// # Fields
    /// * `source` - The underlying validation error
    #[error("Validation error: {source}")]
    Validation { source: ValidationError },
}

impl IcsError {
    /// Returns true for every "lookup came back empty" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IcsError::EndpointNotFound(_)
                | IcsError::DatacenterNotFound(_)
                | IcsError::VmNotFound(_)
                | IcsError::DiskNotFound(_)
                | IcsError::ZoneRegionNotFound(_)
        )
    }

    /// Returns true if the endpoint refused the current credentials.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, IcsError::InvalidCredentials(_))
    }
}

impl From<ValidationError> for IcsError {
    fn from(error: ValidationError) -> Self {
        IcsError::Validation { source: error }
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    ///
    /// # Fields
    /// * `0` - Description of the constraint violation
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Type alias for Results that may fail with an IcsError
pub type IcsResult<T> = Result<T, IcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(IcsError::VmNotFound("x".to_string()).is_not_found());
        assert!(IcsError::ZoneRegionNotFound("z".to_string()).is_not_found());
        assert!(!IcsError::Connection("down".to_string()).is_not_found());
        assert!(!IcsError::CredentialManagerNotFound("Global".to_string()).is_not_found());
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: IcsError = ValidationError::Format("bad".to_string()).into();
        assert!(matches!(err, IcsError::Validation { .. }));
        assert_eq!(err.to_string(), "Validation error: Format error: bad");
    }
}
