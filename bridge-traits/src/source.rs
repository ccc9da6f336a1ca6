//! Document Source Abstraction
//!
//! The contract consumed by the sync engine from the remote document store:
//! a cheap, comparable change token for the document and a full, normalized
//! read of one sheet.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::Result;
use crate::table::{ColumnType, Table};

/// Checkpoint value used when a sheet has never been synced.
pub const EPOCH_TOKEN: &str = "1970-01-01T00:00:00Z";

/// Opaque, monotonically comparable marker of a document revision.
///
/// Tokens that both parse as RFC 3339 timestamps compare by instant, so
/// `2024-01-01T01:00:00+01:00` equals `2024-01-01T00:00:00Z`. Anything else
/// compares as a plain string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_instant(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.0.trim()).ok()
    }

    /// True when this token is strictly newer than `checkpoint`.
    pub fn is_newer_than(&self, checkpoint: &ChangeToken) -> bool {
        self > checkpoint
    }
}

impl Default for ChangeToken {
    fn default() -> Self {
        Self(EPOCH_TOKEN.to_string())
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChangeToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Ord for ChangeToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_instant(), other.as_instant()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ChangeToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ChangeToken {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChangeToken {}

/// Location of a workbook within the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub folder: String,
    pub file_name: String,
}

impl DocumentRef {
    pub fn new(folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
        }
    }

    /// Drive-relative path, `folder/file` (or just `file` for the drive root).
    pub fn path(&self) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", folder, self.file_name)
        }
    }
}

/// Expected source column and its canonical sink name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Header text as it appears in the worksheet.
    #[serde(rename = "name")]
    pub source: String,
    /// Canonical column name in the sink.
    #[serde(alias = "formatted_name")]
    pub column: String,
    /// Declared type; `None` means infer from values.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    /// Output position of the column.
    #[serde(default)]
    pub position: usize,
}

/// One logical sheet: source name, sink table and expected columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSchema {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl SheetSchema {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Columns sorted by their declared position.
    pub fn ordered_columns(&self) -> Vec<&ColumnSpec> {
        let mut columns: Vec<&ColumnSpec> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.position);
        columns
    }
}

/// Derive a sink table name from a sheet name.
///
/// Lower-cases, maps every non-alphanumeric character to `_` and prefixes a
/// leading digit with `_`.
pub fn derive_table_name(sheet_name: &str) -> String {
    let mut name: String = sheet_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Remote document store consumed by the sync engine.
///
/// # Errors
///
/// Transport and authentication failures must be reported as
/// [`BridgeError::SourceUnavailable`](crate::error::BridgeError::SourceUnavailable)
/// so the caller can abort the whole pass.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Current change token of the document.
    async fn fetch_change_token(&self, document: &DocumentRef) -> Result<ChangeToken>;

    /// Read and normalize one sheet of the document.
    ///
    /// Rows come back in source order with positional indices `0..n`.
    async fn read_table(&self, document: &DocumentRef, sheet: &SheetSchema) -> Result<Table>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_compares_temporally() {
        let checkpoint = ChangeToken::new("2024-05-01T10:00:00Z");
        let same_instant = ChangeToken::new("2024-05-01T12:00:00+02:00");
        let later = ChangeToken::new("2024-05-01T10:00:01Z");

        assert_eq!(checkpoint, same_instant);
        assert!(!same_instant.is_newer_than(&checkpoint));
        assert!(later.is_newer_than(&checkpoint));
        assert!(later.is_newer_than(&ChangeToken::default()));
    }

    #[test]
    fn test_token_falls_back_to_string_order() {
        let a = ChangeToken::new("rev-0009");
        let b = ChangeToken::new("rev-0010");
        assert!(b.is_newer_than(&a));
        assert!(!a.is_newer_than(&a));
    }

    #[test]
    fn test_token_serializes_as_plain_string() {
        let token = ChangeToken::default();
        assert_eq!(
            serde_json::to_string(&token).unwrap(),
            "\"1970-01-01T00:00:00Z\""
        );
    }

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("Depot List"), "depot_list");
        assert_eq!(derive_table_name("2024 Prices"), "_2024_prices");
        assert_eq!(derive_table_name("Rates-(USD)"), "rates__usd_");
        assert!(is_valid_identifier(&derive_table_name("Ünïcode")));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("depot_master"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier("depot master"));
        assert!(!is_valid_identifier("x\"; DROP TABLE y; --"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_column_spec_accepts_metadata_aliases() {
        let spec: ColumnSpec = serde_json::from_str(
            r#"{"name": "Depot Name", "formatted_name": "depot_name", "type": "str", "position": 2}"#,
        )
        .unwrap();

        assert_eq!(spec.source, "Depot Name");
        assert_eq!(spec.column, "depot_name");
        assert_eq!(spec.column_type, Some(ColumnType::Text));
        assert_eq!(spec.position, 2);
    }

    #[test]
    fn test_ordered_columns() {
        let schema = SheetSchema::new("Rates", "rates")
            .with_column(ColumnSpec {
                source: "B".into(),
                column: "b".into(),
                column_type: None,
                position: 1,
            })
            .with_column(ColumnSpec {
                source: "A".into(),
                column: "a".into(),
                column_type: None,
                position: 0,
            });

        let names: Vec<&str> = schema
            .ordered_columns()
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_document_path() {
        assert_eq!(
            DocumentRef::new("Depot Master", "rates.xlsx").path(),
            "Depot Master/rates.xlsx"
        );
        assert_eq!(DocumentRef::new("/", "rates.xlsx").path(), "rates.xlsx");
    }
}
