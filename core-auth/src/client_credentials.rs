//! OAuth 2.0 client-credentials grant against the Microsoft identity platform.
//!
//! The provider owns its cached token. It is constructed once, shared behind
//! an `Arc`, and refreshes the token lazily when it is about to expire.

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, TokenErrorResponse, TokenResponse};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Refresh tokens this long before they expire.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Scope requesting every application permission granted to the client on Graph.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Source of bearer tokens for outgoing API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token valid for at least the refresh buffer.
    async fn access_token(&self) -> Result<String>;
}

/// Client-credentials settings for one application registration.
#[derive(Clone)]
pub struct ClientCredentialsConfig {
    pub authority: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl ClientCredentialsConfig {
    pub fn new(
        authority: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: GRAPH_DEFAULT_SCOPE.to_string(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

impl std::fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("authority", &self.authority)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token provider using the client-credentials grant.
///
/// Concurrent callers serialize on the cache lock, so an expiring token is
/// refreshed by exactly one request.
pub struct ClientCredentialsProvider {
    config: ClientCredentialsConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<AccessToken>>,
}

impl ClientCredentialsProvider {
    pub fn new(
        config: ClientCredentialsConfig,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        for (field, value) in [
            ("tenant_id", &config.tenant_id),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::InvalidConfig(format!("{} is empty", field)));
            }
        }

        Ok(Self {
            config,
            http_client,
            clock,
            cached: Mutex::new(None),
        })
    }

    /// Drop the cached token so the next call requests a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[instrument(skip(self), fields(tenant = %self.config.tenant_id))]
    async fn request_token(&self) -> Result<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let encoded_body = serde_urlencoded::to_string(params).map_err(|e| {
            AuthError::InvalidConfig(format!("Failed to encode token request: {}", e))
        })?;

        let request =
            HttpRequest::new(HttpMethod::Post, self.config.token_url()).form_encoded(encoded_body);

        let issued_at = self.clock.now();
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::default())
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let reason = match response.json::<TokenErrorResponse>() {
                Ok(body) => format!(
                    "HTTP {}: {} {}",
                    response.status,
                    body.error.unwrap_or_default(),
                    body.error_description.unwrap_or_default()
                )
                .trim_end()
                .to_string(),
                Err(_) => format!("HTTP {}", response.status),
            };
            warn!(status = response.status, "Token endpoint rejected credentials");
            return Err(AuthError::AuthenticationFailed {
                authority: self.config.authority.clone(),
                reason,
            });
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let secret = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::AuthenticationFailed {
                authority: self.config.authority.clone(),
                reason: "token response has no access_token".to_string(),
            })?;

        info!(expires_in = body.expires_in, "Acquired access token");
        Ok(AccessToken::new(secret, body.expires_in, issued_at))
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        let buffer = TOKEN_REFRESH_BUFFER.as_secs() as i64;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired_with_buffer(buffer, now) {
                debug!("Using cached access token");
                return Ok(token.secret.clone());
            }
            info!("Access token expired or expiring soon, refreshing");
        }

        let token = self.request_token().await?;
        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }
}
