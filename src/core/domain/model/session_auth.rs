use crate::core::domain::value_object::SessionToken;
use std::time::Duration;

/// Authentication state of one endpoint session.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    token: SessionToken,
    user: String,
}

impl SessionAuth {
    pub fn new(token: SessionToken, user: impl Into<String>) -> Self {
        Self {
            token,
            user: user.into(),
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// The user the token was issued to.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_live(&self, lifetime: Duration) -> bool {
        !self.token.is_expired(lifetime)
    }
}
