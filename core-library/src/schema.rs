//! SQL identifier and column-type helpers for sink tables.

use crate::error::{LibraryError, Result};
use bridge_traits::source::is_valid_identifier;
use bridge_traits::table::{ColumnDef, ColumnType};
use std::collections::HashSet;

pub use bridge_traits::table::INDEX_COLUMN;

/// Double-quote an identifier for SQLite.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite declared type for a source column type.
pub fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text => "TEXT",
    }
}

pub fn validate_table_name(table: &str) -> Result<()> {
    if is_valid_identifier(table) {
        Ok(())
    } else {
        Err(LibraryError::invalid_input(
            "table",
            format!("'{}' is not a valid SQL identifier", table),
        ))
    }
}

/// Checks identifiers and rejects columns that shadow the index column or
/// collide with another column once ASCII case is ignored.
pub fn validate_columns(columns: &[ColumnDef]) -> Result<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !is_valid_identifier(&column.name) {
            return Err(LibraryError::invalid_input(
                "column",
                format!("'{}' is not a valid SQL identifier", column.name),
            ));
        }
        if column.name.eq_ignore_ascii_case(INDEX_COLUMN) {
            return Err(LibraryError::invalid_input(
                "column",
                format!("'{}' is reserved for the row index", INDEX_COLUMN),
            ));
        }
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(LibraryError::invalid_input(
                "column",
                format!("'{}' duplicates another column name", column.name),
            ));
        }
    }
    Ok(())
}

/// `CREATE TABLE IF NOT EXISTS` for a sink (or staging) table.
pub fn create_table_sql(table: &str, columns: &[ColumnDef], temporary: bool) -> String {
    let mut definitions = vec![format!(
        "{} INTEGER PRIMARY KEY NOT NULL",
        quote_identifier(INDEX_COLUMN)
    )];
    definitions.extend(
        columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), sql_type(c.column_type))),
    );

    format!(
        "CREATE {}TABLE IF NOT EXISTS {} ({})",
        if temporary { "TEMP " } else { "" },
        quote_identifier(table),
        definitions.join(", ")
    )
}

/// `(?, ?, ?)` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    format!("({})", vec!["?"; count].join(", "))
}
