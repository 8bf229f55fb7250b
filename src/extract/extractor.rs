use tiberius::ColumnData;

use crate::common::schema::{RowSet, TableSpec};
use crate::connection::SqlConnection;
use crate::error::DbError;
use crate::insert::query::{build_select_all, LIST_BASE_TABLES_QUERY};

/// Read side of a connection.
pub struct DatabaseExtractor<'a, C: SqlConnection> {
    conn: &'a mut C,
}

impl<'a, C: SqlConnection> DatabaseExtractor<'a, C> {
    pub fn new(conn: &'a mut C) -> Self {
        DatabaseExtractor { conn }
    }

    /// Every base table in the database, already bracket-quoted.
    pub async fn fetch_tables(&mut self) -> Result<Vec<String>, DbError> {
        let row_set = self.conn.query(LIST_BASE_TABLES_QUERY, &[]).await?;

        row_set
            .rows()
            .iter()
            .map(|row| match row.first().map(|value| value.data()) {
                Some(ColumnData::String(Some(name))) => Ok(name.to_string()),
                _ => Err(DbError::UnexpectedResult(
                    "Failed to retrieve table name".to_string(),
                )),
            })
            .collect()
    }

    /// Full contents of `table` with the column order reported by the source.
    pub async fn read_table(&mut self, table: &TableSpec) -> Result<RowSet, DbError> {
        let query = build_select_all(table);
        let row_set = self.conn.query(&query, &[]).await?;

        if row_set.columns().is_empty() && !row_set.is_empty() {
            return Err(DbError::UnexpectedResult(format!(
                "No column metadata returned for {}",
                table
            )));
        }

        debug!(
            "Fetched {} rows with {} columns from {}",
            row_set.len(),
            row_set.columns().len(),
            table
        );

        Ok(row_set)
    }
}
