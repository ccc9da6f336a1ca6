//! # SharePoint Workbook Provider
//!
//! Reads worksheets of an Excel workbook stored in a SharePoint document
//! library through the Microsoft Graph API.
//!
//! ## Overview
//!
//! - [`GraphWorkbookConnector`] implements [`bridge_traits::source::DocumentSource`]
//! - Site and drive ids are resolved on first use and cached
//! - The workbook's `lastModifiedDateTime` serves as the change token
//! - Worksheet values are normalized into typed [`bridge_traits::table::Table`]s
//!   by [`normalize::normalize_sheet`]

pub mod connector;
pub mod error;
pub mod normalize;
pub mod types;

pub use connector::{GraphSiteConfig, GraphWorkbookConnector, DOCUMENTS_DRIVE};
pub use error::{Result, SharePointError};
pub use normalize::normalize_sheet;
