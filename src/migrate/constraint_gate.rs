use crate::connection::SqlConnection;
use crate::error::MigrateError;
use crate::extract::extractor::DatabaseExtractor;
use crate::insert::query::{build_constraint_batch, build_constraint_procedure, ConstraintAction};
use crate::migrate::migration_options::ConstraintStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Open,
    Suspended { tables: Vec<String> },
    Closed,
}

/// Suspends and re-validates constraint checking on every table of the
/// target database.
///
/// One gate brackets one run: it can be suspended once and restored once.
/// The effect is database-wide, so tables outside the migration list are
/// affected too. Concurrent runs against the same target must be prevented
/// by the caller.
pub struct ConstraintGate {
    strategy: ConstraintStrategy,
    state: GateState,
}

impl ConstraintGate {
    pub fn new(strategy: ConstraintStrategy) -> Self {
        ConstraintGate {
            strategy,
            state: GateState::Open,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.state, GateState::Suspended { .. })
    }

    pub async fn suspend<C: SqlConnection>(&mut self, target: &mut C) -> Result<(), MigrateError> {
        if self.state != GateState::Open {
            return Err(MigrateError::ConstraintGate(
                "constraints can only be suspended once per run",
            ));
        }

        let tables = match self.strategy {
            ConstraintStrategy::Enumerate => {
                let tables = DatabaseExtractor::new(&mut *target)
                    .fetch_tables()
                    .await
                    .map_err(|source| MigrateError::ConstraintSuspend { source })?;

                if !tables.is_empty() {
                    target
                        .execute(&build_constraint_batch(&tables, ConstraintAction::Suspend), &[])
                        .await
                        .map_err(|source| MigrateError::ConstraintSuspend { source })?;
                }

                warn!(
                    "Constraint checking suspended on all {} tables of the target database",
                    tables.len()
                );
                tables
            }
            ConstraintStrategy::ForEachProcedure => {
                target
                    .execute(&build_constraint_procedure(ConstraintAction::Suspend), &[])
                    .await
                    .map_err(|source| MigrateError::ConstraintSuspend { source })?;

                warn!("Constraint checking suspended on every table of the target database");
                Vec::new()
            }
        };

        self.state = GateState::Suspended { tables };
        Ok(())
    }

    /// Re-enables constraints and checks existing rows against them.
    ///
    /// The gate is closed even when validation fails; the failure is the
    /// caller's signal that integrity is unproven.
    pub async fn restore<C: SqlConnection>(&mut self, target: &mut C) -> Result<(), MigrateError> {
        let tables = match std::mem::replace(&mut self.state, GateState::Closed) {
            GateState::Suspended { tables } => tables,
            previous => {
                self.state = previous;
                return Err(MigrateError::ConstraintGate(
                    "constraints can only be restored once, after being suspended",
                ));
            }
        };

        let statement = match self.strategy {
            ConstraintStrategy::Enumerate if tables.is_empty() => None,
            ConstraintStrategy::Enumerate => Some(build_constraint_batch(
                &tables,
                ConstraintAction::Restore,
            )),
            ConstraintStrategy::ForEachProcedure => {
                Some(build_constraint_procedure(ConstraintAction::Restore))
            }
        };

        if let Some(statement) = statement {
            target
                .execute(&statement, &[])
                .await
                .map_err(|source| MigrateError::IntegrityValidation { source })?;
        }

        info!("Constraint checking restored and validated");
        Ok(())
    }
}
