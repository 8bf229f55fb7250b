use std::fmt;
use std::time::Duration;

use crate::common::helpers::format_error_chain;
use crate::error::MigrateError;

/// Position of a run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connected,
    ConstraintsSuspended,
    /// Copying the table at this index of the configured list
    Copying(usize),
    ConstraintsRestored,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Result of copying one table.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub table: String,
    /// Zero for failed tables: nothing from them becomes durable.
    pub rows_copied: usize,
    pub error: Option<MigrateError>,
    pub elapsed: Duration,
}

impl MigrationOutcome {
    pub fn succeeded(table: impl Into<String>, rows_copied: usize, elapsed: Duration) -> Self {
        MigrationOutcome {
            table: table.into(),
            rows_copied,
            error: None,
            elapsed,
        }
    }

    pub fn failed(table: impl Into<String>, error: MigrateError, elapsed: Duration) -> Self {
        MigrationOutcome {
            table: table.into(),
            rows_copied: 0,
            error: Some(error),
            elapsed,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self.error {
            None => OutcomeStatus::Succeeded,
            Some(_) => OutcomeStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == OutcomeStatus::Succeeded
    }
}

/// Summary of a whole run.
#[derive(Debug)]
pub struct MigrationReport {
    pub outcomes: Vec<MigrationOutcome>,
    pub not_attempted: Vec<String>,
    pub state: RunState,
    /// Failures not tied to a single table copy, in the order they happened.
    pub errors: Vec<MigrateError>,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn is_committed(&self) -> bool {
        self.state == RunState::Committed
    }

    pub fn outcome(&self, table: &str) -> Option<&MigrationOutcome> {
        self.outcomes.iter().find(|outcome| outcome.table == table)
    }

    pub fn total_rows(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.rows_copied).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.table.as_str())
            .collect()
    }

    /// The first error of the run, per-table or not.
    pub fn first_error(&self) -> Option<&MigrateError> {
        self.outcomes
            .iter()
            .find_map(|outcome| outcome.error.as_ref())
            .or_else(|| self.errors.first())
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_committed() {
            "committed"
        } else {
            "FAILED"
        };

        writeln!(
            f,
            "Migration {} in {:.2}s: {} of {} tables copied, {} rows",
            verdict,
            self.elapsed.as_secs_f32(),
            self.outcomes.iter().filter(|o| o.is_success()).count(),
            self.outcomes.len() + self.not_attempted.len(),
            self.total_rows()
        )?;

        for outcome in &self.outcomes {
            match &outcome.error {
                None => writeln!(
                    f,
                    "  {}: success, {} rows ({:.2}s)",
                    outcome.table,
                    outcome.rows_copied,
                    outcome.elapsed.as_secs_f32()
                )?,
                Some(err) => writeln!(
                    f,
                    "  {}: failed, {}: {}",
                    outcome.table,
                    err.kind(),
                    format_error_chain(err)
                )?,
            }
        }

        for table in &self.not_attempted {
            writeln!(f, "  {}: not attempted", table)?;
        }

        for err in &self.errors {
            writeln!(f, "  {}: {}", err.kind(), format_error_chain(err))?;
        }

        Ok(())
    }
}
