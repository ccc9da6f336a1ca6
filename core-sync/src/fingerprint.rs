//! Row fingerprints
//!
//! A fingerprint is the SHA-256 digest (lower-case hex) of an unambiguous
//! binary encoding of a row: the column names first, then every value as a
//! tag followed by a length-prefixed payload. Nothing depends on locale,
//! hashing order or platform, so equal rows produce equal fingerprints across
//! restarts and machines.
//!
//! Numbers and text hash by their visible rendering, not by their cell type.
//! An untyped column's type is inferred from all of its values on each read,
//! so `2` may arrive as `Integer(2)`, `Float(2.0)` or `Text("2")` depending on
//! its neighbours; all three must produce the same digest.

use bridge_traits::table::{CellValue, RowIndex, Table};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Row index → fingerprint for one sheet.
pub type SheetFingerprints = BTreeMap<RowIndex, String>;

const ENCODING_VERSION: &[u8] = b"sheet-sync/row/2";

const TAG_COLUMN: u8 = b'c';
const TAG_NULL: u8 = b'n';
const TAG_SCALAR: u8 = b'v';
const TAG_TIMESTAMP: u8 = b't';

/// Floats with no fractional part that fit in an i64 render as integers.
fn integral(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.2e18 {
        Some(value as i64)
    } else {
        None
    }
}

/// The text a float cell shows once its column is cast to text.
fn render_float(value: f64) -> String {
    match integral(value) {
        Some(i) => i.to_string(),
        None => serde_json::Number::from_f64(value)
            .map(|n| n.to_string())
            .unwrap_or_else(|| value.to_string()),
    }
}

fn update_bytes(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn update_value(hasher: &mut Sha256, value: &CellValue) {
    match value {
        CellValue::Null => hasher.update([TAG_NULL]),
        CellValue::Integer(v) => update_bytes(hasher, TAG_SCALAR, v.to_string().as_bytes()),
        CellValue::Float(v) => update_bytes(hasher, TAG_SCALAR, render_float(*v).as_bytes()),
        CellValue::Text(s) => update_bytes(hasher, TAG_SCALAR, s.as_bytes()),
        CellValue::Timestamp(ts) => update_bytes(
            hasher,
            TAG_TIMESTAMP,
            ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string().as_bytes(),
        ),
    }
}

/// Fingerprint one row given the sheet's column names.
pub fn fingerprint_row<S: AsRef<str>>(columns: &[S], values: &[CellValue]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ENCODING_VERSION);

    hasher.update((columns.len() as u64).to_be_bytes());
    for column in columns {
        update_bytes(&mut hasher, TAG_COLUMN, column.as_ref().as_bytes());
    }

    hasher.update((values.len() as u64).to_be_bytes());
    for value in values {
        update_value(&mut hasher, value);
    }

    hex::encode(hasher.finalize())
}

/// Fingerprint every row of a table, keyed by row index.
pub fn fingerprint_table(table: &Table) -> SheetFingerprints {
    let columns = table.column_names();
    table
        .rows()
        .iter()
        .map(|row| (row.index, fingerprint_row(&columns, &row.values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const COLUMNS: [&str; 2] = ["depot", "capacity"];

    #[test]
    fn test_deterministic_hex_digest() {
        let row = vec![CellValue::from("North"), CellValue::Integer(10)];

        let first = fingerprint_row(&COLUMNS, &row);
        let second = fingerprint_row(&COLUMNS, &row.clone());

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_null_differs_from_any_text() {
        let null = fingerprint_row(&COLUMNS, &[CellValue::Null, CellValue::Integer(1)]);

        for text in ["", "null", "None", "NaN", "\u{0}"] {
            let other = fingerprint_row(&COLUMNS, &[CellValue::from(text), CellValue::Integer(1)]);
            assert_ne!(null, other, "null collided with {:?}", text);
        }
    }

    #[test]
    fn test_column_boundaries_are_unambiguous() {
        let a = fingerprint_row(&COLUMNS, &[CellValue::from("ab"), CellValue::from("c")]);
        let b = fingerprint_row(&COLUMNS, &[CellValue::from("a"), CellValue::from("bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_numbers_hash_by_visible_value() {
        let digest = |value: CellValue| fingerprint_row(&["price"], &[value]);

        assert_eq!(digest(CellValue::Integer(2)), digest(CellValue::Float(2.0)));
        assert_eq!(digest(CellValue::Integer(2)), digest(CellValue::from("2")));
        assert_eq!(digest(CellValue::Float(2.5)), digest(CellValue::from("2.5")));
        assert_eq!(digest(CellValue::Float(0.1)), digest(CellValue::from("0.1")));

        assert_ne!(digest(CellValue::Integer(2)), digest(CellValue::Float(2.5)));
        assert_ne!(digest(CellValue::Integer(2)), digest(CellValue::from("2.0")));
    }

    #[test]
    fn test_timestamp_differs_from_its_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();

        assert_ne!(
            fingerprint_row(&["t"], &[CellValue::Timestamp(ts)]),
            fingerprint_row(&["t"], &[CellValue::from("2024-01-01T08:00:00")])
        );
    }

    #[test]
    fn test_column_names_are_part_of_the_digest() {
        let row = [CellValue::from("North"), CellValue::Integer(10)];
        assert_ne!(
            fingerprint_row(&["depot", "capacity"], &row),
            fingerprint_row(&["depot", "size"], &row)
        );
    }

    #[test]
    fn test_signed_zero() {
        assert_eq!(
            fingerprint_row(&["v"], &[CellValue::Float(0.0)]),
            fingerprint_row(&["v"], &[CellValue::Float(-0.0)])
        );
    }

    #[test]
    fn test_timestamps() {
        let ts = |s| {
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, s)
                .unwrap()
        };
        assert_eq!(
            fingerprint_row(&["t"], &[CellValue::Timestamp(ts(0))]),
            fingerprint_row(&["t"], &[CellValue::Timestamp(ts(0))])
        );
        assert_ne!(
            fingerprint_row(&["t"], &[CellValue::Timestamp(ts(0))]),
            fingerprint_row(&["t"], &[CellValue::Timestamp(ts(1))])
        );
    }

    #[test]
    fn test_fingerprint_table() {
        let mut table = Table::new(vec![bridge_traits::table::ColumnDef::new(
            "depot",
            bridge_traits::table::ColumnType::Text,
        )]);
        table.push_row(vec!["North".into()]).unwrap();
        table.push_row(vec!["South".into()]).unwrap();

        let fingerprints = fingerprint_table(&table);

        assert_eq!(fingerprints.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(fingerprints[&0], fingerprint_row(&["depot"], &["North".into()]));
    }
}
