use crate::common::schema::{ColumnList, TableSpec};

/// SQL Server caps a table value constructor at 1000 rows.
pub const MAX_ROWS_PER_INSERT: usize = 1000;

/// RPC calls allow 2100 parameters; keep headroom for the driver's own.
pub const MAX_PARAMETERS_PER_STATEMENT: usize = 2000;

pub const HAS_IDENTITY_QUERY: &str =
    "SELECT OBJECTPROPERTY(OBJECT_ID(@P1), 'TableHasIdentity') AS HAS_IDENTITY";

pub const LIST_BASE_TABLES_QUERY: &str = "SELECT QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME) AS TABLE_NAME \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_SCHEMA, TABLE_NAME";

/// Parameterized multi-row insert with the source's column names spelled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
    columns: String,
    width: usize,
}

impl InsertStatement {
    pub fn new(table: &TableSpec, columns: &ColumnList) -> Self {
        InsertStatement {
            table: table.quoted(),
            columns: columns.quoted(),
            width: columns.len(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Statement text for `rows` value groups, numbering parameters from `@P1`.
    pub fn sql(&self, rows: usize) -> String {
        let value_groups = (0..rows)
            .map(|row| {
                let placeholders = (1..=self.width)
                    .map(|column| format!("@P{}", row * self.width + column))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", placeholders)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table, self.columns, value_groups
        )
    }

    /// Rows sent per statement, bounded by the configured batch size and the
    /// server's row and parameter limits.
    pub fn rows_per_statement(&self, batch_size: usize) -> usize {
        batch_size
            .min(MAX_ROWS_PER_INSERT)
            .min(MAX_PARAMETERS_PER_STATEMENT / self.width.max(1))
            .max(1)
    }
}

pub fn build_select_all(table: &TableSpec) -> String {
    format!("SELECT * FROM {}", table.quoted())
}

pub fn build_identity_insert(table: &TableSpec, enabled: bool) -> String {
    format!(
        "SET IDENTITY_INSERT {} {}",
        table.quoted(),
        if enabled { "ON" } else { "OFF" }
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintAction {
    Suspend,
    Restore,
}

impl ConstraintAction {
    fn clause(&self) -> &'static str {
        match self {
            ConstraintAction::Suspend => "NOCHECK CONSTRAINT ALL",
            ConstraintAction::Restore => "WITH CHECK CHECK CONSTRAINT ALL",
        }
    }
}

/// One batch altering every listed (already quoted) table.
pub fn build_constraint_batch(tables: &[String], action: ConstraintAction) -> String {
    tables
        .iter()
        .map(|table| format!("ALTER TABLE {} {};", table, action.clause()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same effect through the server's undocumented per-table procedure.
pub fn build_constraint_procedure(action: ConstraintAction) -> String {
    format!("EXEC sp_MSforeachtable 'ALTER TABLE ? {}'", action.clause())
}
