use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

/// A bearer access token with its absolute expiry.
///
/// # Security
///
/// The `Debug` implementation redacts the token value.
///
/// # Examples
///
/// ```
/// use core_auth::AccessToken;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let token = AccessToken::new("eyJ0eXAi...".to_string(), 3600, now);
///
/// assert!(!token.is_expired_with_buffer(300, now));
/// assert!(token.is_expired_with_buffer(300, now + Duration::minutes(56)));
/// ```
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token that expires `expires_in` seconds after `issued_at`.
    pub fn new(secret: String, expires_in: i64, issued_at: DateTime<Utc>) -> Self {
        Self {
            secret,
            expires_at: issued_at + Duration::seconds(expires_in),
        }
    }

    /// True if the token is expired at `now` or will expire within `buffer_seconds`.
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(buffer_seconds)
    }

    /// Time remaining until expiry, `None` once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful response of the identity platform token endpoint.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

/// Error body of the token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}
