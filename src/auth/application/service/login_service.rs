use crate::{
    auth::application::{
        request::login_request::LoginRequest, response::login_response::LoginResponse,
    },
    core::domain::{
        error::{IcsError, IcsResult, ValidationError},
        model::session_auth::SessionAuth,
        value_object::{Credentials, SessionToken, validate_password, validate_token, validate_username},
    },
};

use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use tracing::debug;
use url::Url;

pub(crate) const LOGIN_PATH: &str = "api/v1/login";
pub(crate) const LOGOUT_PATH: &str = "api/v1/logout";
pub(crate) const AUTH_HEADER: &str = "Authorization";

#[derive(Debug)]
pub struct LoginService {
    default_headers: HeaderMap,
}

impl LoginService {
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self { default_headers }
    }

    /// Opens a session on the endpoint at `base_url`.
    ///
    /// # Errors
    /// `InvalidCredentials` when the endpoint answers 401/403, `Connection`
    /// for transport failures and unexpected statuses.
    pub async fn execute(
        &self,
        client: &Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> IcsResult<SessionAuth> {
        // Endpoints backed by a secret start without credentials.
        if credentials.is_empty() {
            return Err(IcsError::InvalidCredentials(
                "no credentials available".to_string(),
            ));
        }
        validate_username(credentials.username())?;
        validate_password(credentials.password())?;

        let url = self.build_url(base_url, LOGIN_PATH)?;
        let request = LoginRequest {
            username: credentials.username().to_string(),
            password: credentials.password().to_string(),
        };
        debug!(url = %url, user = credentials.username(), "Logging in");

        let response = client
            .post(url)
            .headers(self.default_headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| IcsError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::OK => self.handle_successful_login(response, credentials).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IcsError::InvalidCredentials(
                format!("login rejected for user {}", credentials.username()),
            )),
            StatusCode::BAD_REQUEST => Err(IcsError::Validation {
                source: ValidationError::Field {
                    field: "request".to_string(),
                    message: "Invalid request format".to_string(),
                },
            }),
            StatusCode::NOT_FOUND => Err(IcsError::Connection(
                "Login endpoint not found".to_string(),
            )),
            StatusCode::SERVICE_UNAVAILABLE => Err(IcsError::Connection(
                "iCenter service is currently unavailable".to_string(),
            )),
            status => Err(IcsError::Connection(format!(
                "Unexpected response status: {}",
                status
            ))),
        }
    }

    /// Closes the session identified by `auth`.
    pub async fn logout(&self, client: &Client, base_url: &Url, auth: &SessionAuth) -> IcsResult<()> {
        let url = self.build_url(base_url, LOGOUT_PATH)?;
        let response = client
            .post(url)
            .headers(self.default_headers.clone())
            .header(AUTH_HEADER, auth.token().as_str())
            .send()
            .await
            .map_err(|e| IcsError::Connection(e.to_string()))?;

        match response.status() {
            // An expired session is already logged out.
            status if status.is_success() || status == StatusCode::UNAUTHORIZED => Ok(()),
            status => Err(IcsError::Connection(format!(
                "Logout failed with status: {}",
                status
            ))),
        }
    }

    fn build_url(&self, base_url: &Url, path: &str) -> IcsResult<Url> {
        base_url
            .join(path)
            .map_err(|e| IcsError::InvalidConfiguration(format!("invalid URL: {}", e)))
    }

    async fn handle_successful_login(
        &self,
        response: reqwest::Response,
        credentials: &Credentials,
    ) -> IcsResult<SessionAuth> {
        let login_response = response.json::<LoginResponse>().await.map_err(|e| {
            IcsError::Connection(format!("Failed to parse login response: {}", e))
        })?;

        validate_token(&login_response.data.token)?;
        let token = SessionToken::new_unchecked(login_response.data.token);
        Ok(SessionAuth::new(token, credentials.username()))
    }
}

impl Default for LoginService {
    fn default() -> Self {
        Self::new()
    }
}
