//! Worksheet normalisation
//!
//! Turns the raw `values` grid of a worksheet into a typed [`Table`]:
//! headers are matched against the sheet metadata ignoring whitespace and
//! case, columns are projected into metadata order under their canonical
//! names, cells are cast to the declared (or inferred) type, and fully empty
//! rows are dropped before positional indices are assigned.

use bridge_traits::error::Result;
use bridge_traits::source::{ColumnSpec, SheetSchema};
use bridge_traits::table::{CellValue, ColumnDef, ColumnType, Table, INDEX_COLUMN};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Largest Excel serial day number (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Header comparison key: whitespace removed, lower-cased.
fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Suffix repeated names with `_1`, `_2`, … keeping the first occurrence as is.
///
/// Names are compared ignoring ASCII case, as SQLite compares identifiers.
pub fn dedupe_column_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.to_string();
        if taken.contains(&candidate.to_ascii_lowercase()) {
            let counter = counters.entry(name.to_ascii_lowercase()).or_insert(0);
            loop {
                *counter += 1;
                candidate = format!("{}_{}", name, counter);
                if !taken.contains(&candidate.to_ascii_lowercase()) {
                    break;
                }
            }
        }
        taken.insert(candidate.to_ascii_lowercase());
        result.push(candidate);
    }

    result
}

fn is_empty_cell(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Integral value of a number, if it has no fractional part and fits in i64.
fn integral(number: f64) -> Option<i64> {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.2e18 {
        Some(number as i64)
    } else {
        None
    }
}

fn number_as_i64(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| n.as_f64().and_then(integral))
}

fn render_number(n: &serde_json::Number) -> String {
    match number_as_i64(n) {
        Some(i) => i.to_string(),
        None => n.to_string(),
    }
}

/// Type a raw cell without any declared type.
fn natural_value(raw: &Value) -> CellValue {
    if is_empty_cell(raw) {
        return CellValue::Null;
    }
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Integer(i),
            None => n.as_f64().map(CellValue::Float).unwrap_or(CellValue::Null),
        },
        _ => cast_text(raw),
    }
}

fn cast_text(raw: &Value) -> CellValue {
    match raw {
        Value::Null => CellValue::Null,
        Value::String(s) if s.trim().is_empty() => CellValue::Null,
        Value::String(s) => CellValue::Text(s.clone()),
        Value::Number(n) => CellValue::Text(render_number(n)),
        Value::Bool(b) => CellValue::Text(b.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

fn cast_integer(raw: &Value) -> CellValue {
    let parsed = match raw {
        Value::Number(n) => number_as_i64(n),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.map(CellValue::Integer).unwrap_or(CellValue::Null)
}

fn cast_float(raw: &Value) -> CellValue {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .map(CellValue::Float)
        .unwrap_or(CellValue::Null)
}

/// Convert an Excel serial date (days since 1899-12-30) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}

/// Parse the textual date formats found in workbooks.
pub fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    text.parse::<f64>().ok().and_then(excel_serial_to_datetime)
}

fn cast_timestamp(raw: &Value) -> CellValue {
    let parsed = match raw {
        Value::Number(n) => n.as_f64().and_then(excel_serial_to_datetime),
        Value::String(s) => parse_datetime_text(s),
        _ => None,
    };
    parsed.map(CellValue::Timestamp).unwrap_or(CellValue::Null)
}

/// Cast one raw cell to a column type. Failed casts become null.
pub fn cast_cell(raw: &Value, column_type: ColumnType) -> CellValue {
    if is_empty_cell(raw) {
        return CellValue::Null;
    }
    match column_type {
        ColumnType::Text => cast_text(raw),
        ColumnType::Integer => cast_integer(raw),
        ColumnType::Float => cast_float(raw),
        ColumnType::Timestamp => cast_timestamp(raw),
    }
}

/// Normalise a worksheet's raw values grid against its metadata.
///
/// The first row of `values` is the header row. Expected columns absent from
/// the header are logged and filled with nulls.
pub fn normalize_sheet(sheet: &SheetSchema, values: &[Vec<Value>]) -> Result<Table> {
    let (header_row, data_rows) = match values.split_first() {
        Some((header, rows)) => (header.as_slice(), rows),
        None => (&[][..], &[][..]),
    };

    let mut header_positions: HashMap<String, usize> = HashMap::new();
    for (position, cell) in header_row.iter().enumerate() {
        header_positions
            .entry(header_key(&header_text(cell)))
            .or_insert(position);
    }

    let specs: Vec<&ColumnSpec> = sheet
        .ordered_columns()
        .into_iter()
        .filter(|spec| !spec.column.eq_ignore_ascii_case(INDEX_COLUMN))
        .collect();

    let source_positions: Vec<Option<usize>> = specs
        .iter()
        .map(|spec| {
            let position = header_positions.get(&header_key(&spec.source)).copied();
            if position.is_none() {
                warn!(
                    sheet = %sheet.name,
                    column = %spec.source,
                    "Schema mismatch: expected column missing from worksheet, filling with nulls"
                );
            }
            position
        })
        .collect();

    let names = dedupe_column_names(specs.iter().map(|spec| spec.column.as_str()));

    // Project raw cells, dropping rows that are empty across every projected column.
    let null = Value::Null;
    let projected: Vec<Vec<&Value>> = data_rows
        .iter()
        .map(|row| {
            source_positions
                .iter()
                .map(|position| position.and_then(|p| row.get(p)).unwrap_or(&null))
                .collect::<Vec<&Value>>()
        })
        .filter(|cells| cells.iter().any(|cell| !is_empty_cell(cell)))
        .collect();

    let dropped = data_rows.len() - projected.len();
    if dropped > 0 {
        debug!(sheet = %sheet.name, dropped, "Dropped empty rows");
    }

    let column_types: Vec<ColumnType> = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            spec.column_type.unwrap_or_else(|| {
                let naturals: Vec<CellValue> =
                    projected.iter().map(|cells| natural_value(cells[i])).collect();
                ColumnType::infer(&naturals)
            })
        })
        .collect();

    let columns = names
        .into_iter()
        .zip(column_types.iter())
        .map(|(name, column_type)| ColumnDef::new(name, *column_type))
        .collect();

    let mut table = Table::new(columns);
    for cells in &projected {
        let values = cells
            .iter()
            .zip(column_types.iter())
            .map(|(raw, column_type)| cast_cell(raw, *column_type))
            .collect();
        table.push_row(values)?;
    }

    Ok(table)
}
