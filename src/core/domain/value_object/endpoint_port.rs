use crate::core::domain::error::ValidationError;

/// Port used when neither the endpoint nor the global section sets one.
pub const DEFAULT_ICENTER_PORT: u16 = 443;

/// A validated iCenter port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPort(u16);

impl EndpointPort {
    /// Creates a new port without validation.
    pub(crate) fn new_unchecked(port: u16) -> Self {
        Self(port)
    }

    /// Returns the port number.
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl Default for EndpointPort {
    fn default() -> Self {
        Self(DEFAULT_ICENTER_PORT)
    }
}

/// Validates a port number.
pub(crate) fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::Field {
            field: "port".to_string(),
            message: "Port cannot be 0".to_string(),
        });
    }
    Ok(())
}

/// Parses a textual port (config files and environment carry strings).
pub(crate) fn parse_port(value: &str) -> Result<u16, ValidationError> {
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|e| ValidationError::Format(format!("Invalid port '{}': {}", value, e)))?;
    validate_port(port)?;
    Ok(port)
}
