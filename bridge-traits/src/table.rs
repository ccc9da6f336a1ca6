//! Tabular Value Types
//!
//! The normalized, typed representation of one worksheet read. Rows carry a
//! zero-based positional index that is only meaningful within a single read:
//! it is re-assigned every time the sheet is read, so change detection built
//! on top of it is positional rather than key-based.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Positional row index within one read of one sheet.
pub type RowIndex = i64;

/// Column holding the [`RowIndex`]; the primary key of every sink table.
pub const INDEX_COLUMN: &str = "instance_id";

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Convert to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to f64 if possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Borrow the text payload if this is a text cell
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Storage type of a column.
///
/// Serialized with the short names used by sheet metadata files
/// (`str`, `int`, `float`, `datetime`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "int", alias = "integer")]
    Integer,
    #[serde(rename = "float", alias = "real")]
    Float,
    #[serde(rename = "datetime", alias = "timestamp")]
    Timestamp,
    #[serde(rename = "str", alias = "text", alias = "string")]
    Text,
}

impl ColumnType {
    /// Infer a column type from the runtime types of its values.
    ///
    /// Nulls are ignored. Integers mixed with floats widen to `Float`; any
    /// other mix, and an all-null column, falls back to `Text`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a CellValue>) -> Self {
        let mut inferred: Option<ColumnType> = None;

        for value in values {
            let current = match value {
                CellValue::Null => continue,
                CellValue::Integer(_) => ColumnType::Integer,
                CellValue::Float(_) => ColumnType::Float,
                CellValue::Timestamp(_) => ColumnType::Timestamp,
                CellValue::Text(_) => return ColumnType::Text,
            };

            inferred = Some(match (inferred, current) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Integer), ColumnType::Float)
                | (Some(ColumnType::Float), ColumnType::Integer) => ColumnType::Float,
                _ => return ColumnType::Text,
            });
        }

        inferred.unwrap_or(ColumnType::Text)
    }
}

/// A named, typed column of a normalized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One row of a normalized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    pub index: RowIndex,
    pub values: Vec<CellValue>,
}

/// A normalized table: ordered columns and positionally indexed rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<SheetRow>,
}

impl Table {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, assigning it the next positional index.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values does not match the column count.
    pub fn push_row(&mut self, values: Vec<CellValue>) -> Result<RowIndex> {
        if values.len() != self.columns.len() {
            return Err(BridgeError::OperationFailed(format!(
                "Row has {} values but table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }

        let index = self.rows.len() as RowIndex;
        self.rows.push(SheetRow { index, values });
        Ok(index)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }

    pub fn row(&self, index: RowIndex) -> Option<&SheetRow> {
        usize::try_from(index).ok().and_then(|i| self.rows.get(i))
    }

    /// Rows for the given indices, in the order requested. Unknown indices are skipped.
    pub fn select(&self, indices: &[RowIndex]) -> Vec<SheetRow> {
        indices
            .iter()
            .filter_map(|&index| self.row(index).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_push_row_assigns_positional_index() {
        let mut table = Table::new(vec![
            ColumnDef::new("depot", ColumnType::Text),
            ColumnDef::new("price", ColumnType::Float),
        ]);

        assert_eq!(table.push_row(vec!["A".into(), 1.5.into()]).unwrap(), 0);
        assert_eq!(table.push_row(vec!["B".into(), CellValue::Null]).unwrap(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).unwrap().values[0], CellValue::from("B"));
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = Table::new(vec![ColumnDef::new("depot", ColumnType::Text)]);
        assert!(table.push_row(vec!["A".into(), "B".into()]).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_select_preserves_row_data() {
        let mut table = Table::new(vec![ColumnDef::new("n", ColumnType::Integer)]);
        for i in 0..4 {
            table.push_row(vec![CellValue::Integer(i * 10)]).unwrap();
        }

        let selected = table.select(&[3, 1, 9]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].index, 3);
        assert_eq!(selected[0].values, vec![CellValue::Integer(30)]);
        assert_eq!(selected[1].index, 1);
    }

    #[test]
    fn test_infer_column_type() {
        let ints = [CellValue::Integer(1), CellValue::Null, CellValue::Integer(2)];
        assert_eq!(ColumnType::infer(&ints), ColumnType::Integer);

        let mixed = [CellValue::Integer(1), CellValue::Float(2.5)];
        assert_eq!(ColumnType::infer(&mixed), ColumnType::Float);

        let stamps = [CellValue::Timestamp(ts())];
        assert_eq!(ColumnType::infer(&stamps), ColumnType::Timestamp);

        let text = [CellValue::Integer(1), CellValue::from("x")];
        assert_eq!(ColumnType::infer(&text), ColumnType::Text);

        let odd = [CellValue::Integer(1), CellValue::Timestamp(ts())];
        assert_eq!(ColumnType::infer(&odd), ColumnType::Text);

        let empty: [CellValue; 2] = [CellValue::Null, CellValue::Null];
        assert_eq!(ColumnType::infer(&empty), ColumnType::Text);
    }

    #[test]
    fn test_column_type_metadata_names() {
        let t: ColumnType = serde_json::from_str("\"datetime\"").unwrap();
        assert_eq!(t, ColumnType::Timestamp);
        let t: ColumnType = serde_json::from_str("\"str\"").unwrap();
        assert_eq!(t, ColumnType::Text);
        assert_eq!(serde_json::to_string(&ColumnType::Integer).unwrap(), "\"int\"");
    }
}
