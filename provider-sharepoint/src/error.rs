//! Error types for the SharePoint workbook provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharePointError {
    /// Token acquisition failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Graph returned a non-success status
    #[error("Graph API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Drive '{0}' not found on site")]
    DriveNotFound(String),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Worksheet not found: {0}")]
    WorksheetNotFound(String),

    /// Response body did not have the expected shape
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SharePointError>;

impl From<AuthError> for SharePointError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NetworkError(msg) => SharePointError::NetworkError(msg),
            other => SharePointError::AuthenticationFailed(other.to_string()),
        }
    }
}

/// Every failure to reach or read the document store is a source outage from
/// the caller's point of view. Only malformed payloads are reported as plain
/// operation failures.
impl From<SharePointError> for BridgeError {
    fn from(error: SharePointError) -> Self {
        match error {
            SharePointError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            SharePointError::BridgeError(e) => e,
            other => BridgeError::SourceUnavailable(other.to_string()),
        }
    }
}
