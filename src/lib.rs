//! Copies the full contents of an ordered list of tables from one SQL Server
//! database to another, preserving explicit identity values.
//!
//! Constraint checking on the target is suspended for the duration of the
//! copy and re-validated before anything is committed. All writes share one
//! target transaction, so a failed run leaves the target unchanged.

#[macro_use]
extern crate log;

pub mod common;
pub mod config;
pub mod connection;
pub mod error;
pub mod extract;
pub mod insert;
pub mod migrate;

#[cfg(test)]
mod testing;

pub use crate::common::schema::TableSpec;
pub use crate::config::{Config, DatabaseConfig};
pub use crate::connection::{ConnectionProvider, SqlConnection, TiberiusProvider};
pub use crate::error::{DbError, MigrateError, Role};
pub use crate::migrate::migration_options::{ConstraintStrategy, FailurePolicy, MigrationOptions};
pub use crate::migrate::migration_result::{
    MigrationOutcome, MigrationReport, OutcomeStatus, RunState,
};
pub use crate::migrate::migrator::DatabaseMigrator;

/// Runs a migration with default options against live SQL Server databases.
pub async fn run_migration(
    source: &DatabaseConfig,
    target: &DatabaseConfig,
    tables: &[TableSpec],
) -> MigrationReport {
    run_migration_with_options(source, target, tables, MigrationOptions::default()).await
}

/// Like [`run_migration`], with explicit batch size, timeout, failure policy
/// and constraint strategy.
pub async fn run_migration_with_options(
    source: &DatabaseConfig,
    target: &DatabaseConfig,
    tables: &[TableSpec],
    options: MigrationOptions,
) -> MigrationReport {
    DatabaseMigrator::new(TiberiusProvider, options)
        .run(source, target, tables)
        .await
}
