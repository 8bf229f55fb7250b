//! Error types for table migration.

use std::time::Duration;

use thiserror::Error;

/// Failure raised by a database handle, independent of which step issued it.
#[derive(Error, Debug)]
pub enum DbError {
    /// Driver-level failure (network, login, statement error)
    #[error("{0}")]
    Driver(#[from] tiberius::error::Error),

    /// Connection pool could not hand out a connection
    #[error("Pool error: {0}")]
    Pool(String),

    /// A single operation exceeded the configured timeout
    #[error("Operation timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// A result set did not have the shape the caller expected
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// An earlier operation on this connection timed out mid-request
    #[error("Connection abandoned after an earlier timeout")]
    Abandoned,

    #[error("{0}")]
    Other(String),
}

/// Which end of the migration a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Target => write!(f, "target"),
        }
    }
}

/// Typed failure of one migration step.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Cannot reach or authenticate to a database
    #[error("Cannot connect to {role} database: {source}")]
    Connection { role: Role, source: DbError },

    /// Source query or fetch failed for a table
    #[error("Read failed for table {table}: {source}")]
    Read { table: String, source: DbError },

    /// Target insert failed for a table, including constraint violations
    #[error("Write failed for table {table}: {source}")]
    Write { table: String, source: DbError },

    /// Constraint enforcement could not be suspended on the target
    #[error("Cannot suspend constraint checking on target: {source}")]
    ConstraintSuspend { source: DbError },

    /// Re-validating constraints found invalid data or could not run
    #[error("Integrity validation failed on target: {source}")]
    IntegrityValidation { source: DbError },

    /// Constraints could not be re-validated because the target connection
    /// was unusable
    #[error("Integrity validation could not run: {reason}")]
    ValidationNotRun { reason: String },

    /// Suspend or Restore issued out of order
    #[error("Constraint gate misuse: {0}")]
    ConstraintGate(&'static str),

    /// Target transaction could not be opened or committed
    #[error("Target transaction failed: {source}")]
    Transaction { source: DbError },

    /// Invalid input handed to the migrator
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    pub fn read(table: impl Into<String>, source: DbError) -> Self {
        MigrateError::Read {
            table: table.into(),
            source,
        }
    }

    pub fn write(table: impl Into<String>, source: DbError) -> Self {
        MigrateError::Write {
            table: table.into(),
            source,
        }
    }

    /// Short name of the error class, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Connection { .. } => "ConnectionError",
            MigrateError::Read { .. } => "ReadError",
            MigrateError::Write { .. } => "WriteError",
            MigrateError::ConstraintSuspend { .. } => "ConstraintSuspendError",
            MigrateError::IntegrityValidation { .. } => "IntegrityValidationError",
            MigrateError::ValidationNotRun { .. } => "ValidationNotRunError",
            MigrateError::ConstraintGate(_) => "ConstraintGateError",
            MigrateError::Transaction { .. } => "TransactionError",
            MigrateError::Config(_) => "ConfigError",
        }
    }
}
