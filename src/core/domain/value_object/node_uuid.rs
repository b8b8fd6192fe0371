use crate::core::domain::error::{IcsError, IcsResult, ValidationError};

/// Prefix for every provider ID this cloud provider hands to Kubernetes.
pub const PROVIDER_PREFIX: &str = "ics://";

/// A VM UUID in canonical form (trimmed, lower-case).
///
/// Every key in the node index goes through this type, so lookups never
/// need case-insensitive comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeUuid(String);

impl NodeUuid {
    /// Canonicalises any UUID spelling.
    pub fn new(raw: &str) -> Self {
        Self(canonicalize(raw))
    }

    /// Parses a provider ID (`ics://<uuid>`) or a bare UUID.
    ///
    /// # Errors
    /// Returns a validation error if nothing is left once the prefix is stripped.
    pub fn from_provider_id(provider_id: &str) -> IcsResult<Self> {
        let trimmed = provider_id.trim();
        let raw = trimmed.strip_prefix(PROVIDER_PREFIX).unwrap_or(trimmed);
        let uuid = Self::new(raw);
        if uuid.is_empty() {
            return Err(IcsError::from(ValidationError::Field {
                field: "providerID".to_string(),
                message: format!("'{}' carries no UUID", provider_id),
            }));
        }
        Ok(uuid)
    }

    /// Returns the canonical UUID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `ics://<uuid>`.
    #[must_use]
    pub fn provider_id(&self) -> String {
        format!("{}{}", PROVIDER_PREFIX, self.0)
    }
}

impl std::fmt::Display for NodeUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeUuid {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Trims and lower-cases a UUID string.
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}
