//! # Sync Service Configuration
//!
//! Configuration for the sheet sync service: Graph credentials, the location
//! of the source workbook, the sheet metadata that maps worksheets onto sink
//! tables, and the local paths and timings of the sync loop.
//!
//! ## Overview
//!
//! [`SyncServiceConfig`] is built either programmatically through
//! [`SyncServiceConfig::builder()`] or from the process environment through
//! [`SyncServiceConfig::from_env()`]. Both paths end in the same fail-fast
//! validation, so a config that exists is a config the service can run with.
//!
//! ## Environment
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `SHEET_SYNC_TENANT_ID` | yes | |
//! | `SHEET_SYNC_CLIENT_ID` | yes | |
//! | `SHEET_SYNC_CLIENT_SECRET` | yes | |
//! | `SHEET_SYNC_GRAPH_API` | no | `https://graph.microsoft.com/v1.0` |
//! | `SHEET_SYNC_AUTHORITY` | no | `https://login.microsoftonline.com` |
//! | `SHEET_SYNC_SITE_DOMAIN` | yes | |
//! | `SHEET_SYNC_SITE_NAME` | yes | |
//! | `SHEET_SYNC_FOLDER` | no | `Depot Master` |
//! | `SHEET_SYNC_FILE_NAME` | yes | |
//! | `SHEET_SYNC_METADATA_PATH` | yes | |
//! | `SHEET_SYNC_DATABASE_PATH` | yes | |
//! | `SHEET_SYNC_STATE_DIR` | no | `.` |
//! | `SHEET_SYNC_INTERVAL_SECS` | no | `300` |
//! | `SHEET_SYNC_PASS_TIMEOUT_SECS` | no | `600` |
//!
//! A `.env` file can be loaded first with [`load_env_file`].
//!
//! ## Sheet Metadata
//!
//! ```json
//! {
//!   "sheets": [
//!     {
//!       "name": "Depot List",
//!       "table_name": "depot_list",
//!       "columns": [
//!         { "name": "Depot Name", "column": "depot_name", "type": "str", "position": 0 },
//!         { "name": "Capacity", "column": "capacity", "type": "int", "position": 1 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `table_name` may be omitted, in which case it is derived from the sheet
//! name. `formatted_name` is accepted in place of `column` and `table_name`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncServiceConfig;
//!
//! core_runtime::config::load_env_file(None)?;
//! let config = SyncServiceConfig::from_env()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::source::{derive_table_name, is_valid_identifier, ColumnSpec, SheetSchema};
use bridge_traits::table::INDEX_COLUMN;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SHEET_SYNC_";

pub const DEFAULT_GRAPH_API: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_FOLDER: &str = "Depot Master";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 600;

pub const SNAPSHOT_FILE_NAME: &str = "fingerprints.json";
pub const CHECKPOINT_FILE_NAME: &str = "sync_checkpoints.json";

/// Client credentials for the Microsoft identity platform.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for GraphCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***REDACTED***")
            .finish()
    }
}

/// Where the source workbook lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub graph_api_base: String,
    pub authority: String,
    pub site_domain: String,
    pub site_name: String,
    pub folder: String,
    pub file_name: String,
}

/// Complete configuration of the sync service.
#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    pub credentials: GraphCredentials,
    pub source: SourceConfig,
    /// Sheets to sync, in processing order.
    pub sheets: Vec<SheetSchema>,
    /// SQLite database holding the sink tables.
    pub database_path: PathBuf,
    /// Directory holding the fingerprint snapshot and checkpoint files.
    pub state_dir: PathBuf,
    /// Time between the starts of two scheduled passes.
    pub interval: Duration,
    /// Hard limit on a single pass.
    pub pass_timeout: Duration,
}

impl SyncServiceConfig {
    pub fn builder() -> SyncServiceConfigBuilder {
        SyncServiceConfigBuilder::default()
    }

    /// Build a config from `SHEET_SYNC_*` process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names including the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &str| {
            get(name).ok_or_else(|| Error::MissingSetting {
                key: format!("{}{}", ENV_PREFIX, name),
                message: "environment variable is not set".to_string(),
            })
        };
        let seconds = |name: &str, default: u64| -> Result<u64> {
            match get(name) {
                Some(raw) => raw.parse::<u64>().map_err(|e| {
                    Error::Config(format!("{}{} must be a whole number of seconds: {}", ENV_PREFIX, name, e))
                }),
                None => Ok(default),
            }
        };

        let metadata_path = PathBuf::from(require("METADATA_PATH")?);
        let sheets = load_sheet_metadata(&metadata_path)?;

        Self::builder()
            .tenant_id(require("TENANT_ID")?)
            .client_id(require("CLIENT_ID")?)
            .client_secret(require("CLIENT_SECRET")?)
            .graph_api_base(get("GRAPH_API").unwrap_or_else(|| DEFAULT_GRAPH_API.to_string()))
            .authority(get("AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()))
            .site_domain(require("SITE_DOMAIN")?)
            .site_name(require("SITE_NAME")?)
            .folder(get("FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string()))
            .file_name(require("FILE_NAME")?)
            .sheets(sheets)
            .database_path(require("DATABASE_PATH")?)
            .state_dir(get("STATE_DIR").unwrap_or_else(|| ".".to_string()))
            .interval(Duration::from_secs(seconds(
                "INTERVAL_SECS",
                DEFAULT_INTERVAL_SECS,
            )?))
            .pass_timeout(Duration::from_secs(seconds(
                "PASS_TIMEOUT_SECS",
                DEFAULT_PASS_TIMEOUT_SECS,
            )?))
            .build()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir.join(CHECKPOINT_FILE_NAME)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Credentials and source location are present
    /// - At least one sheet is configured
    /// - Sheet names and sink table names are unique
    /// - Table and column names are valid SQL identifiers
    /// - Interval and pass timeout are non-zero
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("tenant_id", &self.credentials.tenant_id),
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
            ("graph_api_base", &self.source.graph_api_base),
            ("authority", &self.source.authority),
            ("site_domain", &self.source.site_domain),
            ("site_name", &self.source.site_name),
            ("file_name", &self.source.file_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} cannot be empty", field)));
            }
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than 0 seconds".to_string(),
            ));
        }

        if self.pass_timeout.is_zero() {
            return Err(Error::Config(
                "Pass timeout must be greater than 0 seconds".to_string(),
            ));
        }

        validate_sheets(&self.sheets)
    }
}

/// Validate a set of sheet schemas independently of the rest of the config.
pub fn validate_sheets(sheets: &[SheetSchema]) -> Result<()> {
    if sheets.is_empty() {
        return Err(Error::Config(
            "At least one sheet must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut tables = HashSet::new();

    for sheet in sheets {
        if sheet.name.trim().is_empty() {
            return Err(Error::Config("Sheet name cannot be empty".to_string()));
        }
        if !names.insert(sheet.name.as_str()) {
            return Err(Error::Config(format!(
                "Sheet '{}' is configured more than once",
                sheet.name
            )));
        }
        if !is_valid_identifier(&sheet.table_name) {
            return Err(Error::Config(format!(
                "Sheet '{}' maps to invalid table name '{}'",
                sheet.name, sheet.table_name
            )));
        }
        if !tables.insert(sheet.table_name.to_ascii_lowercase()) {
            return Err(Error::Config(format!(
                "Table '{}' is targeted by more than one sheet",
                sheet.table_name
            )));
        }

        for column in &sheet.columns {
            if column.column.eq_ignore_ascii_case(INDEX_COLUMN) {
                continue;
            }
            if !is_valid_identifier(&column.column) {
                return Err(Error::Config(format!(
                    "Sheet '{}' has invalid column name '{}'",
                    sheet.name, column.column
                )));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct SheetMetadataFile {
    sheets: Vec<SheetMetadata>,
}

#[derive(Debug, Deserialize)]
struct SheetMetadata {
    name: String,
    #[serde(default, alias = "formatted_name")]
    table_name: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnSpec>,
}

impl From<SheetMetadata> for SheetSchema {
    fn from(meta: SheetMetadata) -> Self {
        let table_name = meta
            .table_name
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| derive_table_name(&meta.name));

        SheetSchema {
            name: meta.name,
            table_name,
            columns: meta.columns,
        }
    }
}

/// Parse sheet metadata from JSON text.
///
/// `origin` is only used in error messages.
pub fn parse_sheet_metadata(json: &str, origin: &str) -> Result<Vec<SheetSchema>> {
    let file: SheetMetadataFile = serde_json::from_str(json).map_err(|e| Error::Metadata {
        path: origin.to_string(),
        message: e.to_string(),
    })?;

    Ok(file.sheets.into_iter().map(SheetSchema::from).collect())
}

/// Load sheet metadata from a JSON file.
pub fn load_sheet_metadata(path: &Path) -> Result<Vec<SheetSchema>> {
    let json = std::fs::read_to_string(path).map_err(|e| Error::Metadata {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_sheet_metadata(&json, &path.display().to_string())
}

/// Load a `.env` file into the process environment.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// current directory or its parents is loaded if present. Variables already
/// set in the environment take precedence. Returns the loaded path, if any.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                Error::Config(format!("Failed to load env file {}: {}", path.display(), e))
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(Error::Config(format!("Failed to load .env file: {}", e))),
        },
    }
}

/// Builder for constructing [`SyncServiceConfig`] instances.
///
/// Call [`build()`](SyncServiceConfigBuilder::build) to validate and produce
/// the final config.
#[derive(Default)]
pub struct SyncServiceConfigBuilder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    graph_api_base: Option<String>,
    authority: Option<String>,
    site_domain: Option<String>,
    site_name: Option<String>,
    folder: Option<String>,
    file_name: Option<String>,
    sheets: Vec<SheetSchema>,
    database_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    interval: Option<Duration>,
    pass_timeout: Option<Duration>,
}

impl SyncServiceConfigBuilder {
    pub fn tenant_id(mut self, value: impl Into<String>) -> Self {
        self.tenant_id = Some(value.into());
        self
    }

    pub fn client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = Some(value.into());
        self
    }

    pub fn client_secret(mut self, value: impl Into<String>) -> Self {
        self.client_secret = Some(value.into());
        self
    }

    /// Graph API base URL. Default: `https://graph.microsoft.com/v1.0`
    pub fn graph_api_base(mut self, value: impl Into<String>) -> Self {
        self.graph_api_base = Some(value.into());
        self
    }

    /// Identity platform authority. Default: `https://login.microsoftonline.com`
    pub fn authority(mut self, value: impl Into<String>) -> Self {
        self.authority = Some(value.into());
        self
    }

    pub fn site_domain(mut self, value: impl Into<String>) -> Self {
        self.site_domain = Some(value.into());
        self
    }

    pub fn site_name(mut self, value: impl Into<String>) -> Self {
        self.site_name = Some(value.into());
        self
    }

    /// Drive folder containing the workbook. Default: `Depot Master`
    pub fn folder(mut self, value: impl Into<String>) -> Self {
        self.folder = Some(value.into());
        self
    }

    pub fn file_name(mut self, value: impl Into<String>) -> Self {
        self.file_name = Some(value.into());
        self
    }

    pub fn sheet(mut self, sheet: SheetSchema) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn sheets(mut self, sheets: Vec<SheetSchema>) -> Self {
        self.sheets = sheets;
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Directory for persisted sync state. Default: current directory
    pub fn state_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    /// Default: 300 seconds
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Default: 600 seconds
    pub fn pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = Some(timeout);
        self
    }

    /// Builds the final `SyncServiceConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if a required value is missing or the result fails
    /// [`SyncServiceConfig::validate`].
    pub fn build(self) -> Result<SyncServiceConfig> {
        fn required(value: Option<String>, setter: &str) -> Result<String> {
            value.ok_or_else(|| {
                Error::Config(format!(
                    "{} is required. Use .{}() to set it.",
                    setter, setter
                ))
            })
        }

        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = SyncServiceConfig {
            credentials: GraphCredentials {
                tenant_id: required(self.tenant_id, "tenant_id")?,
                client_id: required(self.client_id, "client_id")?,
                client_secret: required(self.client_secret, "client_secret")?,
            },
            source: SourceConfig {
                graph_api_base: self
                    .graph_api_base
                    .unwrap_or_else(|| DEFAULT_GRAPH_API.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                authority: self
                    .authority
                    .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                site_domain: required(self.site_domain, "site_domain")?,
                site_name: required(self.site_name, "site_name")?,
                folder: self.folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
                file_name: required(self.file_name, "file_name")?,
            },
            sheets: self.sheets,
            database_path,
            state_dir: self.state_dir.unwrap_or_else(|| PathBuf::from(".")),
            interval: self
                .interval
                .unwrap_or(Duration::from_secs(DEFAULT_INTERVAL_SECS)),
            pass_timeout: self
                .pass_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_PASS_TIMEOUT_SECS)),
        };

        config.validate()?;

        Ok(config)
    }
}
