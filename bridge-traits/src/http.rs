//! HTTP Client Abstraction
//!
//! The Graph connector and the token provider only ever issue bearer GETs and
//! form-encoded POSTs, so the request model is kept to exactly that.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Outgoing request, built fluently.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request timeout; the client default applies when unset
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Attach an `application/x-www-form-urlencoded` body that was encoded by the caller.
    pub fn form_encoded(mut self, encoded: String) -> Self {
        self.body = Some(Bytes::from(encoded));
        self.header("Content-Type", "application/x-www-form-urlencoded")
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Fully buffered response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Throttling (429) and server errors (5xx) are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }

    /// Body as text for error messages, with invalid UTF-8 replaced.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Async HTTP client trait
///
/// Abstracts the transport so the Graph connector and the token provider can
/// be tested against mocks. Transport failures (connect, TLS, timeout) are
/// reported as [`BridgeError::SourceUnavailable`]; any HTTP status, including
/// errors, comes back as an [`HttpResponse`].
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn site(client: &dyn HttpClient, token: &str) -> Result<serde_json::Value> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://graph.microsoft.com/v1.0/sites/root")
///         .bearer_token(token);
///
///     client.execute(request).await?.json()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute, retrying transport failures and retryable statuses.
    ///
    /// The default implementation does not retry.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body),
        }
    }

    #[test]
    fn test_bearer_get_request() {
        let request = HttpRequest::new(HttpMethod::Get, "https://graph.example/sites/root")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_form_encoded_sets_content_type() {
        let request = HttpRequest::new(HttpMethod::Post, "https://login.example/token")
            .form_encoded("grant_type=client_credentials".to_string());

        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            request.body.as_deref(),
            Some(&b"grant_type=client_credentials"[..])
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(response(429, "").is_retryable());
        assert!(response(503, "").is_retryable());
        assert!(!response(404, "").is_retryable());
        assert!(!response(200, "").is_retryable());
        assert!(response(204, "").is_success());
    }

    #[test]
    fn test_json_and_lossy_body() {
        let ok = response(200, r#"{"id":"abc"}"#);
        let value: serde_json::Value = ok.json().unwrap();
        assert_eq!(value["id"], "abc");

        let bad = response(200, "not json");
        assert!(matches!(
            bad.json::<serde_json::Value>(),
            Err(BridgeError::OperationFailed(_))
        ));
        assert_eq!(bad.body_lossy(), "not json");
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(350));
    }
}
