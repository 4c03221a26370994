//! OAuth client-credentials authentication against the OFSC token service.

use crate::errors::{OfscError, OfscErrorKind, OfscResult};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Path of the token endpoint relative to the instance base URL.
pub const TOKEN_PATH: &str = "/rest/oauthTokenService/v2/token";

/// Client credentials for an OFSC instance.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: SecretString,
    /// Instance name, the first label of the instance host.
    pub instance: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            instance: instance.into(),
        }
    }

    /// Basic authorization header value: `base64(clientId@instance:secret)`.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!(
            "{}@{}:{}",
            self.client_id,
            self.instance,
            self.client_secret.expose_secret()
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        format!("Basic {}", encoded)
    }
}

/// Opaque bearer token.
///
/// Expiry is never inspected; a token is replaced only after the backend
/// reports it unauthorized.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Wraps a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Exposes the raw token value.
    pub fn secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// Bearer authorization header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.secret() == other.secret()
    }
}

impl Eq for AccessToken {}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges credentials for a bearer token.
///
/// Implementations never retry; the resilient requester owns that decision.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquires a fresh token.
    async fn acquire_token(&self, credentials: &Credentials) -> OfscResult<AccessToken>;
}

/// Token provider calling the OFSC OAuth token service.
pub struct OAuthTokenProvider {
    transport: Arc<dyn HttpTransport>,
    token_url: String,
}

impl OAuthTokenProvider {
    /// Creates a provider posting to `{base_url}/rest/oauthTokenService/v2/token`.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            token_url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
        }
    }

    /// Gets the token endpoint URL.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn acquire_token(&self, credentials: &Credentials) -> OfscResult<AccessToken> {
        let body = serde_urlencoded::to_string([("grant_type", "client_credentials")])
            .map_err(|e| OfscError::authentication(format!("Failed to encode body: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, self.token_url.clone())
            .header("content-type", "application/x-www-form-urlencoded")
            .header("accept", "application/json")
            .header("authorization", credentials.basic_auth_header())
            .body(body);

        tracing::debug!(url = %self.token_url, client_id = %credentials.client_id, "Requesting OAuth token");

        let response = self.transport.send(request).await.map_err(|e| {
            OfscError::authentication(format!("Token request failed: {}", e.message())).with_cause(e)
        })?;

        if !response.is_success() {
            tracing::error!(status = response.status, "OAuth token request rejected");
            return Err(OfscError::new(
                OfscErrorKind::AuthError,
                "Token request rejected",
            )
            .with_status(response.status)
            .with_body(response.body));
        }

        let token: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            OfscError::authentication(format!("Malformed token response: {}", e))
                .with_status(response.status)
        })?;

        if token.access_token.is_empty() {
            return Err(OfscError::authentication("Token response carried an empty access_token"));
        }

        Ok(AccessToken::new(token.access_token))
    }
}
