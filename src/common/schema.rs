use std::fmt;

use tiberius::{ColumnData, ToSql};

use crate::common::helpers::quote_ident;

/// One table to migrate. The name must exist identically in source and target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSpec {
    name: String,
}

impl TableSpec {
    /// Accepts `table` or `schema.table`.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into().trim().to_string();

        if name.is_empty() {
            return Err("Table name cannot be empty".to_string());
        }

        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 || parts.iter().any(|part| part.trim().is_empty()) {
            return Err(format!("Invalid table name: {}", name));
        }

        Ok(TableSpec { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bracket-quoted identifier, e.g. `[dbo].[Users]`.
    pub fn quoted(&self) -> String {
        self.name
            .split('.')
            .map(|part| quote_ident(part.trim()))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A single column value, kept exactly as the driver decoded it.
///
/// Values are never converted between read and write, so identity and
/// key columns reach the target bit-for-bit.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlValue(ColumnData<'static>);

impl SqlValue {
    pub fn new(data: ColumnData<'static>) -> Self {
        SqlValue(data)
    }

    pub fn data(&self) -> &ColumnData<'static> {
        &self.0
    }

    pub fn into_inner(self) -> ColumnData<'static> {
        self.0
    }
}

impl From<ColumnData<'static>> for SqlValue {
    fn from(data: ColumnData<'static>) -> Self {
        SqlValue(data)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        self.0.clone()
    }
}

pub type Row = Vec<SqlValue>;

/// Ordered column names, taken once per table from the source result metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnList(Vec<String>);

impl ColumnList {
    pub fn new(columns: Vec<String>) -> Self {
        ColumnList(columns)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Comma-separated, bracket-quoted column list in source order.
    pub fn quoted(&self) -> String {
        self.0
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// All rows fetched from one source table, aligned to its column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: ColumnList,
    rows: Vec<Row>,
}

impl RowSet {
    /// Fails when any row's arity differs from the column list.
    pub fn new(columns: ColumnList, rows: Vec<Row>) -> Result<Self, String> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(format!(
                "Row {} has {} values but {} columns were reported",
                index,
                row.len(),
                columns.len()
            ));
        }

        Ok(RowSet { columns, rows })
    }

    pub fn columns(&self) -> &ColumnList {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}
