//! # Bridge Traits
//!
//! Value types and collaborator contracts shared by every crate in the sync
//! workspace.
//!
//! ## Overview
//!
//! The sync engine never talks to the network or the document store
//! directly. It consumes the traits defined here, and concrete adapters live
//! in their own crates:
//!
//! | Trait | Purpose | Implementation |
//! |-------|---------|----------------|
//! | [`HttpClient`](http::HttpClient) | Async HTTP with retry and timeouts | `bridge-desktop` |
//! | [`DocumentSource`](source::DocumentSource) | Change token and normalized sheet reads | `provider-sharepoint` |
//! | [`Clock`](time::Clock) | Injectable time source | [`SystemClock`](time::SystemClock) |
//!
//! ## Data Model
//!
//! - [`Table`](table::Table): typed columns plus rows carrying a positional index
//! - [`SheetSchema`](source::SheetSchema): a sheet's source name, sink table and expected columns
//! - [`ChangeToken`](source::ChangeToken): comparable revision marker of the source document
//!
//! ## Error Handling
//!
//! All traits return [`BridgeError`](error::BridgeError). Adapters convert
//! their own error types at the seam and report transport or authentication
//! failures as `SourceUnavailable`.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so they can be shared across tasks
//! behind `Arc<dyn Trait>`.

pub mod error;
pub mod http;
pub mod source;
pub mod table;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use source::{
    derive_table_name, is_valid_identifier, ChangeToken, ColumnSpec, DocumentRef, DocumentSource,
    SheetSchema, EPOCH_TOKEN,
};
pub use table::{CellValue, ColumnDef, ColumnType, RowIndex, SheetRow, Table, INDEX_COLUMN};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
