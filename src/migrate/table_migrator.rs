use tokio::time::Instant;

use crate::common::schema::TableSpec;
use crate::connection::SqlConnection;
use crate::error::{DbError, MigrateError};
use crate::extract::extractor::DatabaseExtractor;
use crate::insert::inserter::DatabaseInserter;
use crate::insert::query::InsertStatement;
use crate::migrate::migration_result::MigrationOutcome;

/// Copies one table's full contents from source to target, keeping
/// explicit identity values.
pub struct TableMigrator<'a, S: SqlConnection, T: SqlConnection> {
    source: &'a mut S,
    target: &'a mut T,
    batch_size: usize,
}

impl<'a, S: SqlConnection, T: SqlConnection> TableMigrator<'a, S, T> {
    pub fn new(source: &'a mut S, target: &'a mut T, batch_size: usize) -> Self {
        TableMigrator {
            source,
            target,
            batch_size,
        }
    }

    pub async fn copy_table(&mut self, table: &TableSpec) -> MigrationOutcome {
        info!("Migrating table: {}", table);

        let start_time = Instant::now();

        match self.migrate_table_rows(table).await {
            Ok(migrated_count) => {
                let elapsed = start_time.elapsed();
                info!(
                    "Table {} migrated, rows: {}, took: {}s",
                    table,
                    migrated_count,
                    elapsed.as_secs_f32()
                );
                MigrationOutcome::succeeded(table.name(), migrated_count, elapsed)
            }
            Err(err) => {
                error!("Table {} failed: {}", table, err);
                MigrationOutcome::failed(table.name(), err, start_time.elapsed())
            }
        }
    }

    async fn migrate_table_rows(&mut self, table: &TableSpec) -> Result<usize, MigrateError> {
        let row_set = DatabaseExtractor::new(&mut *self.source)
            .read_table(table)
            .await
            .map_err(|err| MigrateError::read(table.name(), err))?;

        if row_set.is_empty() {
            info!("Table {} is empty, skipping", table);
            return Ok(0);
        }

        let write_error = |err: DbError| MigrateError::write(table.name(), err);

        let statement = InsertStatement::new(table, row_set.columns());
        let rows_per_statement = statement.rows_per_statement(self.batch_size);
        let mut inserter = DatabaseInserter::new(&mut *self.target);

        let identity = inserter.has_identity(table).await.map_err(write_error)?;
        if identity {
            inserter
                .set_identity_insert(table, true)
                .await
                .map_err(write_error)?;
        }

        let inserted = inserter
            .insert_rows(&statement, &row_set, rows_per_statement)
            .await;

        if identity {
            if let Err(err) = inserter.set_identity_insert(table, false).await {
                if inserted.is_ok() {
                    return Err(write_error(err));
                }
                warn!("Could not disable identity insert on {}: {}", table, err);
            }
        }

        inserted.map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use tiberius::ColumnData;

    use super::*;
    use crate::common::schema::SqlValue;
    use crate::testing::{int, int_row, text, FakeConnection};

    fn users_source() -> FakeConnection {
        let mut source = FakeConnection::default();
        source.with_table(
            "p_Usuarios",
            &["Id", "Nombre", "Activo"],
            vec![
                vec![int(5), text("Ana"), SqlValue::new(ColumnData::Bit(Some(true)))],
                vec![int(7), text("Luis"), SqlValue::new(ColumnData::Bit(None))],
                vec![int(9), text("Eva"), SqlValue::new(ColumnData::Bit(Some(false)))],
            ],
        );
        source
    }

    fn identity_target() -> FakeConnection {
        let mut target = FakeConnection::default();
        target.with_identity_table("[p_Usuarios]");
        target
    }

    #[tokio::test]
    async fn test_copy_preserves_identity_values() {
        let mut source = users_source();
        let mut target = identity_target();
        let source_rows = source
            .query("SELECT * FROM [p_Usuarios]", &[])
            .await
            .unwrap()
            .into_rows();
        let log = target.log();
        let table = TableSpec::new("p_Usuarios").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 1000)
            .copy_table(&table)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.rows_copied, 3);
        assert_eq!(log.visible_rows("[p_Usuarios]"), source_rows);

        let statements = log.statements();
        assert_eq!(statements[1], "SET IDENTITY_INSERT [p_Usuarios] ON");
        assert_eq!(
            statements[2],
            "INSERT INTO [p_Usuarios] ([Id], [Nombre], [Activo]) VALUES (@P1, @P2, @P3), (@P4, @P5, @P6), (@P7, @P8, @P9)"
        );
        assert_eq!(statements[3], "SET IDENTITY_INSERT [p_Usuarios] OFF");
    }

    #[tokio::test]
    async fn test_empty_table_writes_nothing() {
        let mut source = FakeConnection::default();
        source.with_table("p_Checkins", &["Id", "UsuarioId"], vec![]);
        let mut target = FakeConnection::default();
        let log = target.log();
        let table = TableSpec::new("p_Checkins").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 1000)
            .copy_table(&table)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.rows_copied, 0);
        assert!(log.statements().is_empty());
    }

    #[tokio::test]
    async fn test_identity_disabled_after_failed_insert() {
        let mut source = users_source();
        let mut target = identity_target();
        target.fail_on("INSERT INTO", "Violation of PRIMARY KEY constraint");
        let log = target.log();
        let table = TableSpec::new("p_Usuarios").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 1000)
            .copy_table(&table)
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.rows_copied, 0);
        assert!(matches!(outcome.error, Some(MigrateError::Write { .. })));
        assert_eq!(
            log.statements().last().map(String::as_str),
            Some("SET IDENTITY_INSERT [p_Usuarios] OFF")
        );
    }

    #[tokio::test]
    async fn test_table_without_identity_skips_toggle() {
        let mut source = FakeConnection::default();
        source.with_table("p_TareaAsignados", &["TareaId", "UsuarioId"], vec![int_row(&[1, 5])]);
        let mut target = FakeConnection::default();
        target.with_existing_table("[p_TareaAsignados]");
        let log = target.log();
        let table = TableSpec::new("p_TareaAsignados").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 1000)
            .copy_table(&table)
            .await;

        assert!(outcome.is_success());
        assert_eq!(log.count("IDENTITY_INSERT"), 0);
        assert_eq!(log.visible_rows("[p_TareaAsignados]"), vec![int_row(&[1, 5])]);
    }

    #[tokio::test]
    async fn test_read_failure_is_read_error() {
        let mut source = FakeConnection::default();
        source.fail_on("p_Tareas", "Invalid object name 'p_Tareas'");
        let mut target = FakeConnection::default();
        let log = target.log();
        let table = TableSpec::new("p_Tareas").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 1000)
            .copy_table(&table)
            .await;

        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("ReadError"));
        assert!(log.statements().is_empty());
    }

    #[tokio::test]
    async fn test_small_batches_split_inserts() {
        let mut source = users_source();
        let mut target = identity_target();
        let log = target.log();
        let table = TableSpec::new("p_Usuarios").unwrap();

        let outcome = TableMigrator::new(&mut source, &mut target, 2)
            .copy_table(&table)
            .await;

        assert_eq!(outcome.rows_copied, 3);
        assert_eq!(log.statements_starting_with("INSERT").len(), 2);
        assert_eq!(log.count("IDENTITY_INSERT [p_Usuarios] ON"), 1);
    }
}
