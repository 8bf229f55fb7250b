use tiberius::ColumnData;
use tokio::time::Instant;

use crate::common::schema::{RowSet, SqlValue, TableSpec};
use crate::connection::SqlConnection;
use crate::error::DbError;
use crate::extract::format::format_row_preview;
use crate::insert::query::{build_identity_insert, InsertStatement, HAS_IDENTITY_QUERY};

/// Write side of the target connection.
pub struct DatabaseInserter<'a, C: SqlConnection> {
    conn: &'a mut C,
}

impl<'a, C: SqlConnection> DatabaseInserter<'a, C> {
    pub fn new(conn: &'a mut C) -> Self {
        DatabaseInserter { conn }
    }

    pub async fn has_identity(&mut self, table: &TableSpec) -> Result<bool, DbError> {
        let param = SqlValue::new(ColumnData::String(Some(table.quoted().into())));
        let row_set = self.conn.query(HAS_IDENTITY_QUERY, &[param]).await?;

        match row_set.rows().first().and_then(|row| row.first()).map(|v| v.data()) {
            Some(ColumnData::I32(Some(flag))) => Ok(*flag == 1),
            // OBJECT_ID yields NULL when the table is missing on the target
            Some(ColumnData::I32(None)) => Err(DbError::UnexpectedResult(format!(
                "Table {} does not exist on the target",
                table
            ))),
            _ => Err(DbError::UnexpectedResult(format!(
                "Cannot determine identity column for {}",
                table
            ))),
        }
    }

    pub async fn set_identity_insert(
        &mut self,
        table: &TableSpec,
        enabled: bool,
    ) -> Result<(), DbError> {
        self.conn
            .execute(&build_identity_insert(table, enabled), &[])
            .await?;
        Ok(())
    }

    /// Inserts every row of `row_set`, `rows_per_statement` rows at a time.
    pub async fn insert_rows(
        &mut self,
        statement: &InsertStatement,
        row_set: &RowSet,
        rows_per_statement: usize,
    ) -> Result<usize, DbError> {
        let mut inserted = 0;

        for chunk in row_set.rows().chunks(rows_per_statement.max(1)) {
            let start_time = Instant::now();
            let sql = statement.sql(chunk.len());
            let params = chunk.iter().flatten().cloned().collect::<Vec<SqlValue>>();

            if let Err(err) = self.conn.execute(&sql, &params).await {
                if let Some(first_row) = chunk.first() {
                    debug!(
                        "Batch starting at row {} failed, first row: {}",
                        inserted,
                        format_row_preview(row_set.columns(), first_row)
                    );
                }
                return Err(err);
            }

            inserted += chunk.len();

            debug!(
                "Executed batch with {} rows, {} parameters, took: {}s",
                chunk.len(),
                params.len(),
                start_time.elapsed().as_secs_f32()
            );
        }

        Ok(inserted)
    }
}
