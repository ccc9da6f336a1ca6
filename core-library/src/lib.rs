//! # Sink Database Module
//!
//! Owns the relational sink that synchronized sheets are written to.
//!
//! ## Overview
//!
//! This module manages:
//! - The SQLite connection pool ([`db`])
//! - Identifier quoting and column types for sink tables ([`schema`])
//! - The [`SinkWriter`] seam and its SQLite implementation ([`sink`]):
//!   additive table creation, staged upserts and deletes keyed by row index

pub mod db;
pub mod error;
pub mod schema;
pub mod sink;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use sink::{SinkWriter, SqliteSinkWriter};
