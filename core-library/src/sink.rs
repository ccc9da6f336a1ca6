//! Relational sink writer
//!
//! Applies diff results to SQLite tables keyed by the row index. Upserts go
//! through a temporary staging table that is merged into the target inside a
//! single transaction, so a batch is applied completely or not at all.

use crate::error::{LibraryError, Result};
use crate::schema::{
    create_table_sql, placeholders, quote_identifier, sql_type, validate_columns,
    validate_table_name, INDEX_COLUMN,
};
use async_trait::async_trait;
use bridge_traits::table::{CellValue, ColumnDef, RowIndex, SheetRow};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Upper bound on bound parameters per statement (SQLite's historical limit is 999).
const MAX_BIND_PARAMETERS: usize = 900;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Write access to the relational sink
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Create the table if absent and add any missing columns
    ///
    /// Never drops or retypes existing columns. Safe to call every pass.
    async fn ensure_table(&self, table: &str, columns: &[ColumnDef]) -> Result<()>;

    /// Insert or replace `rows` by row index, atomically
    ///
    /// Every row must carry one value per column in `columns`. An empty
    /// `rows` slice returns `Ok(0)` without touching the database.
    ///
    /// # Returns
    /// Number of rows written
    async fn upsert(&self, table: &str, columns: &[ColumnDef], rows: &[SheetRow]) -> Result<u64>;

    /// Delete rows by index
    ///
    /// Absent indices are ignored. An empty `indices` slice returns `Ok(0)`
    /// without touching the database.
    ///
    /// # Returns
    /// Number of rows actually removed
    async fn delete(&self, table: &str, indices: &[RowIndex]) -> Result<u64>;
}

/// SQLite implementation of [`SinkWriter`]
pub struct SqliteSinkWriter {
    pool: SqlitePool,
}

impl SqliteSinkWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn merge_batch(&self, table: &str, columns: &[ColumnDef], rows: &[SheetRow]) -> Result<()> {
        let staging = staging_table_name();
        let target = quote_identifier(table);
        let staging_quoted = quote_identifier(&staging);
        let index = quote_identifier(INDEX_COLUMN);

        let column_list = std::iter::once(INDEX_COLUMN)
            .chain(columns.iter().map(|c| c.name.as_str()))
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", ");

        // Dropping `tx` on any early return rolls back, staging table included.
        let mut tx = self.pool.begin().await?;

        sqlx::query(&create_table_sql(&staging, columns, true))
            .execute(&mut *tx)
            .await?;

        let row_width = columns.len() + 1;
        let rows_per_statement = (MAX_BIND_PARAMETERS / row_width).max(1);

        for chunk in rows.chunks(rows_per_statement) {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                staging_quoted,
                column_list,
                vec![placeholders(row_width); chunk.len()].join(", ")
            );

            let mut query = sqlx::query(&sql);
            for row in chunk {
                query = query.bind(row.index);
                for value in &row.values {
                    query = bind_cell(query, value);
                }
            }
            query.execute(&mut *tx).await?;
        }

        let updated = if columns.is_empty() {
            0
        } else {
            let assignments = columns
                .iter()
                .map(|c| {
                    let name = quote_identifier(&c.name);
                    format!("{0} = s.{0}", name)
                })
                .collect::<Vec<_>>()
                .join(", ");

            sqlx::query(&format!(
                "UPDATE {target} SET {assignments} FROM {staging_quoted} AS s \
                 WHERE {target}.{index} = s.{index}"
            ))
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        let inserted = sqlx::query(&format!(
            "INSERT INTO {target} ({column_list}) SELECT {column_list} FROM {staging_quoted} \
             WHERE {index} NOT IN (SELECT {index} FROM {target})"
        ))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(&format!("DROP TABLE {}", staging_quoted))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(staging = %staging, updated, inserted, "Merged staging table");
        Ok(())
    }

    async fn delete_indices(&self, table: &str, indices: &[RowIndex]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for chunk in indices.chunks(MAX_BIND_PARAMETERS) {
            let sql = format!(
                "DELETE FROM {} WHERE {} IN {}",
                quote_identifier(table),
                quote_identifier(INDEX_COLUMN),
                placeholders(chunk.len())
            );

            let mut query = sqlx::query(&sql);
            for index in chunk {
                query = query.bind(*index);
            }
            removed += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn create_or_extend(&self, table: &str, columns: &[ColumnDef]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&create_table_sql(table, columns, false))
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query(&format!("PRAGMA table_info({})", quote_identifier(table)))
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for column in columns {
            if existing.iter().any(|name| name.eq_ignore_ascii_case(&column.name)) {
                continue;
            }

            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_identifier(table),
                quote_identifier(&column.name),
                sql_type(column.column_type)
            ))
            .execute(&mut *tx)
            .await?;

            info!(table, column = %column.name, "Added column to sink table");
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SinkWriter for SqliteSinkWriter {
    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    async fn ensure_table(&self, table: &str, columns: &[ColumnDef]) -> Result<()> {
        validate_table_name(table)?;
        validate_columns(columns)?;

        self.create_or_extend(table, columns).await.map_err(|e| {
            warn!(table, error = %e, "Failed to ensure sink table");
            e
        })
    }

    #[instrument(skip(self, columns, rows), fields(rows = rows.len()))]
    async fn upsert(&self, table: &str, columns: &[ColumnDef], rows: &[SheetRow]) -> Result<u64> {
        if rows.is_empty() {
            debug!(table, "Nothing to upsert");
            return Ok(0);
        }

        validate_table_name(table)?;
        validate_columns(columns)?;

        if let Some(row) = rows.iter().find(|r| r.values.len() != columns.len()) {
            return Err(LibraryError::invalid_input(
                "rows",
                format!(
                    "row {} has {} values, expected {}",
                    row.index,
                    row.values.len(),
                    columns.len()
                ),
            ));
        }

        self.merge_batch(table, columns, rows).await.map_err(|e| {
            warn!(table, error = %e, "Upsert rolled back");
            e
        })?;

        info!(table, rows = rows.len(), "Upserted rows");
        Ok(rows.len() as u64)
    }

    #[instrument(skip(self, indices), fields(indices = indices.len()))]
    async fn delete(&self, table: &str, indices: &[RowIndex]) -> Result<u64> {
        if indices.is_empty() {
            debug!(table, "Nothing to delete");
            return Ok(0);
        }

        validate_table_name(table)?;

        let removed = self.delete_indices(table, indices).await.map_err(|e| {
            warn!(table, error = %e, "Delete rolled back");
            e
        })?;

        info!(table, requested = indices.len(), removed, "Deleted rows");
        Ok(removed)
    }
}

fn staging_table_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("staging_{}", &id[..8])
}

fn bind_cell<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &CellValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        CellValue::Null => query.bind(None::<String>),
        CellValue::Integer(v) => query.bind(*v),
        CellValue::Float(v) => query.bind(*v),
        CellValue::Timestamp(ts) => query.bind(ts.format(TIMESTAMP_FORMAT).to_string()),
        CellValue::Text(s) => query.bind(s.clone()),
    }
}
