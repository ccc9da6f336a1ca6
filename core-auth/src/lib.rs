//! # Authentication Module
//!
//! Access tokens for the Microsoft Graph API using the OAuth 2.0
//! client-credentials grant.
//!
//! ## Overview
//!
//! [`ClientCredentialsProvider`] is an explicit, constructed dependency: it is
//! built once from configuration and handed to the document-store connector.
//! The current token and its expiry are owned state of that instance, and the
//! token is refreshed shortly before it expires instead of being cached
//! forever.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{ClientCredentialsConfig, ClientCredentialsProvider, TokenProvider};
//! use bridge_traits::time::SystemClock;
//! use std::sync::Arc;
//!
//! let provider = ClientCredentialsProvider::new(
//!     ClientCredentialsConfig::new(authority, tenant_id, client_id, client_secret),
//!     http_client,
//!     Arc::new(SystemClock),
//! )?;
//! let bearer = provider.access_token().await?;
//! ```

pub mod client_credentials;
pub mod error;
pub mod types;

pub use client_credentials::{
    ClientCredentialsConfig, ClientCredentialsProvider, TokenProvider, GRAPH_DEFAULT_SCOPE,
    TOKEN_REFRESH_BUFFER,
};
pub use error::{AuthError, Result};
pub use types::AccessToken;
