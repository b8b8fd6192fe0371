//! Credential managers resolve endpoint credentials at runtime.

use crate::core::domain::{
    error::{IcsError, IcsResult},
    value_object::Credentials,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Source of fresh credentials for an endpoint address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialManager: Send + Sync {
    /// Returns the current credentials for `server`.
    ///
    /// # Errors
    /// Returns `InvalidCredentials` if no credentials exist for the server.
    async fn get_credential(&self, server: &str) -> IcsResult<Credentials>;
}

/// In-memory credentials, keyed by endpoint address.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialManager {
    by_server: HashMap<String, Credentials>,
    fallback: Option<Credentials>,
}

impl StaticCredentialManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: impl Into<String>, credentials: Credentials) -> Self {
        self.by_server.insert(server.into(), credentials);
        self
    }

    /// Credentials returned for servers without their own entry.
    pub fn with_default(mut self, credentials: Credentials) -> Self {
        self.fallback = Some(credentials);
        self
    }
}

#[async_trait]
impl CredentialManager for StaticCredentialManager {
    async fn get_credential(&self, server: &str) -> IcsResult<Credentials> {
        self.by_server
            .get(server)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                IcsError::InvalidCredentials(format!("no credentials stored for {}", server))
            })
    }
}

/// Reads `<dir>/<server>.username` and `<dir>/<server>.password`.
#[derive(Debug, Clone)]
pub struct SecretsDirectoryCredentialManager {
    directory: PathBuf,
}

impl SecretsDirectoryCredentialManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    async fn read_entry(&self, server: &str, suffix: &str) -> IcsResult<String> {
        let path = self.directory.join(format!("{}.{}", server, suffix));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            IcsError::InvalidCredentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value = raw.trim().to_string();
        if value.is_empty() {
            return Err(IcsError::InvalidCredentials(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl CredentialManager for SecretsDirectoryCredentialManager {
    async fn get_credential(&self, server: &str) -> IcsResult<Credentials> {
        debug!(server, directory = %self.directory.display(), "Reading credentials from secrets directory");
        let username = self.read_entry(server, "username").await?;
        let password = self.read_entry(server, "password").await?;
        Ok(Credentials::new(username, password))
    }
}
