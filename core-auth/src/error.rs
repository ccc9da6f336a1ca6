use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication against {authority} failed: {reason}")]
    AuthenticationFailed { authority: String, reason: String },

    #[error("Network error during authentication: {0}")]
    NetworkError(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Invalid credentials configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
