//! Worksheet reads fed through the diff engine, as a pass does it.

use bridge_traits::source::{ColumnSpec, SheetSchema};
use core_library::{create_test_pool, SinkWriter, SqliteSinkWriter};
use core_sync::{diff_table, fingerprint_table};
use provider_sharepoint::normalize_sheet;
use serde_json::{json, Value};

fn depot_prices() -> SheetSchema {
    SheetSchema::new("Prices", "prices")
        .with_column(ColumnSpec {
            source: "Depot".to_string(),
            column: "depot".to_string(),
            column_type: None,
            position: 0,
        })
        .with_column(ColumnSpec {
            source: "Price".to_string(),
            column: "price".to_string(),
            column_type: None,
            position: 1,
        })
}

fn grid(rows: Value) -> Vec<Vec<Value>> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row.as_array().unwrap().clone())
        .collect()
}

#[test]
fn test_removing_fractional_row_leaves_integral_row_unchanged() {
    let sheet = depot_prices();
    let before = normalize_sheet(
        &sheet,
        &grid(json!([["Depot", "Price"], ["North", 2], ["South", 2.5]])),
    )
    .unwrap();
    let after = normalize_sheet(&sheet, &grid(json!([["Depot", "Price"], ["North", 2]]))).unwrap();

    let diff = diff_table(&fingerprint_table(&before), &after);

    assert!(diff.added.is_empty());
    assert!(diff.changed.is_empty());
    assert_eq!(diff.removed, vec![1]);
}

#[test]
fn test_text_entering_numeric_column_changes_only_that_row() {
    let sheet = depot_prices();
    let before = normalize_sheet(
        &sheet,
        &grid(json!([["Depot", "Price"], ["North", 2], ["South", 2.5], ["East", 3]])),
    )
    .unwrap();
    let after = normalize_sheet(
        &sheet,
        &grid(json!([["Depot", "Price"], ["North", 2], ["South", 2.5], ["East", "n/a"]])),
    )
    .unwrap();

    let diff = diff_table(&fingerprint_table(&before), &after);

    assert_eq!(diff.changed, vec![2]);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
}

#[tokio::test]
async fn test_columns_differing_only_in_case_can_be_written() {
    let sheet = SheetSchema::new("Rates", "rates")
        .with_column(ColumnSpec {
            source: "Rate".to_string(),
            column: "Rate".to_string(),
            column_type: None,
            position: 0,
        })
        .with_column(ColumnSpec {
            source: "Rate (old)".to_string(),
            column: "rate".to_string(),
            column_type: None,
            position: 1,
        });
    let table = normalize_sheet(
        &sheet,
        &grid(json!([["Rate", "Rate (old)"], [1.5, 1.25]])),
    )
    .unwrap();
    assert_eq!(table.column_names(), vec!["Rate", "rate_1"]);

    let sink = SqliteSinkWriter::new(create_test_pool().await.unwrap());
    sink.ensure_table("rates", table.columns()).await.unwrap();
    let written = sink
        .upsert("rates", table.columns(), table.rows())
        .await
        .unwrap();

    assert_eq!(written, 1);
}
