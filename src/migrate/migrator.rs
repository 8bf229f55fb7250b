use std::collections::HashSet;

use tokio::time::Instant;

use crate::common::schema::TableSpec;
use crate::config::DatabaseConfig;
use crate::connection::{bounded, BoundedConnection, ConnectionProvider, SqlConnection};
use crate::error::{MigrateError, Role};
use crate::migrate::constraint_gate::ConstraintGate;
use crate::migrate::migration_options::{FailurePolicy, MigrationOptions};
use crate::migrate::migration_result::{MigrationOutcome, MigrationReport, RunState};
use crate::migrate::table_migrator::TableMigrator;

/// Drives a whole run: connect, suspend constraints, copy every table in
/// order, restore constraints, commit.
///
/// All target writes share one transaction that is committed only after
/// constraints were re-validated, so a failed run leaves nothing durable.
pub struct DatabaseMigrator<P: ConnectionProvider> {
    provider: P,
    options: MigrationOptions,
    history: Vec<RunState>,
}

impl<P: ConnectionProvider> DatabaseMigrator<P> {
    pub fn new(provider: P, options: MigrationOptions) -> Self {
        DatabaseMigrator {
            provider,
            options,
            history: vec![RunState::Idle],
        }
    }

    /// Every state the last run went through, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    fn transition(&mut self, state: RunState) {
        debug!("Run state: {:?} -> {:?}", self.state(), state);
        self.history.push(state);
    }

    pub async fn run(
        &mut self,
        source_config: &DatabaseConfig,
        target_config: &DatabaseConfig,
        tables: &[TableSpec],
    ) -> MigrationReport {
        self.history = vec![RunState::Idle];

        let start_time = Instant::now();
        let mut run = RunRecord::new(tables);

        if let Err(err) = check_duplicate_tables(tables) {
            run.errors.push(err);
            self.transition(RunState::Failed);
            return run.finish(RunState::Failed, start_time);
        }

        info!("Initializing connections...");

        let (mut source, mut target) = match self.connect(source_config, target_config).await {
            Ok(connections) => connections,
            Err(err) => {
                error!("{}", err);
                run.errors.push(err);
                self.transition(RunState::Failed);
                return run.finish(RunState::Failed, start_time);
            }
        };

        self.transition(RunState::Connected);

        if let Err(err) = target.begin().await {
            run.errors.push(MigrateError::Transaction { source: err });
            self.transition(RunState::Failed);
            return run.finish(RunState::Failed, start_time);
        }

        let mut gate = ConstraintGate::new(self.options.constraint_strategy);

        if let Err(err) = gate.suspend(&mut target).await {
            error!("{}", err);
            run.errors.push(err);
            rollback(&mut target, &mut run).await;
            self.transition(RunState::Failed);
            return run.finish(RunState::Failed, start_time);
        }

        self.transition(RunState::ConstraintsSuspended);

        self.copy_tables(&mut source, &mut target, tables, &mut run)
            .await;
        let copy_failed = run.outcomes.iter().any(|outcome| !outcome.is_success());

        // Always attempted, so the target is never left without constraints.
        // An abandoned session cannot run it; closing that session rolls the
        // transaction back, suspension included.
        let restored = if target.is_abandoned() {
            Err(MigrateError::ValidationNotRun {
                reason: "target connection was abandoned after a timeout".to_string(),
            })
        } else {
            gate.restore(&mut target).await
        };

        match (copy_failed, restored) {
            (false, Ok(())) => {}
            (false, Err(err)) => {
                error!("{}", err);
                run.errors.push(err);
                rollback(&mut target, &mut run).await;
                self.transition(RunState::Failed);
                return run.finish(RunState::Failed, start_time);
            }
            (true, restored) => {
                if let Err(err) = restored {
                    warn!("Restoring constraints after a failed copy also failed: {}", err);
                    run.errors.push(err);
                }
                rollback(&mut target, &mut run).await;
                self.transition(RunState::Failed);
                return run.finish(RunState::Failed, start_time);
            }
        }

        self.transition(RunState::ConstraintsRestored);

        if let Err(err) = target.commit().await {
            let err = MigrateError::Transaction { source: err };
            error!("{}", err);
            run.errors.push(err);
            rollback(&mut target, &mut run).await;
            self.transition(RunState::Failed);
            return run.finish(RunState::Failed, start_time);
        }

        self.transition(RunState::Committed);
        run.finish(RunState::Committed, start_time)
    }

    async fn connect(
        &self,
        source_config: &DatabaseConfig,
        target_config: &DatabaseConfig,
    ) -> Result<
        (
            BoundedConnection<P::Connection>,
            BoundedConnection<P::Connection>,
        ),
        MigrateError,
    > {
        let limit = self.options.operation_timeout;

        let source = bounded(limit, self.provider.connect(source_config, Role::Source))
            .await
            .map_err(|source| MigrateError::Connection {
                role: Role::Source,
                source,
            })?;

        let target = bounded(limit, self.provider.connect(target_config, Role::Target))
            .await
            .map_err(|source| MigrateError::Connection {
                role: Role::Target,
                source,
            })?;

        Ok((
            BoundedConnection::new(source, limit),
            BoundedConnection::new(target, limit),
        ))
    }

    async fn copy_tables<S: SqlConnection, T: SqlConnection>(
        &mut self,
        source: &mut S,
        target: &mut T,
        tables: &[TableSpec],
        run: &mut RunRecord,
    ) {
        info!(
            "Tables to migrate: {}",
            tables
                .iter()
                .map(TableSpec::name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        for (index, table) in tables.iter().enumerate() {
            self.transition(RunState::Copying(index));

            let outcome = TableMigrator::new(&mut *source, &mut *target, self.options.batch_size)
                .copy_table(table)
                .await;
            let failed = !outcome.is_success();
            run.record(outcome);

            if failed && self.options.failure_policy == FailurePolicy::AbortOnFirstError {
                warn!(
                    "Aborting after failure of table {}, {} tables skipped",
                    table,
                    tables.len() - index - 1
                );
                break;
            }
        }
    }
}

/// Report under construction.
struct RunRecord {
    outcomes: Vec<MigrationOutcome>,
    pending: Vec<String>,
    errors: Vec<MigrateError>,
}

impl RunRecord {
    fn new(tables: &[TableSpec]) -> Self {
        RunRecord {
            outcomes: Vec::new(),
            pending: tables.iter().map(|table| table.name().to_string()).collect(),
            errors: Vec::new(),
        }
    }

    fn record(&mut self, outcome: MigrationOutcome) {
        self.pending.retain(|table| *table != outcome.table);
        self.outcomes.push(outcome);
    }

    fn finish(self, state: RunState, start_time: Instant) -> MigrationReport {
        MigrationReport {
            outcomes: self.outcomes,
            not_attempted: self.pending,
            state,
            errors: self.errors,
            elapsed: start_time.elapsed(),
        }
    }
}

async fn rollback<C: SqlConnection>(target: &mut BoundedConnection<C>, run: &mut RunRecord) {
    if target.is_abandoned() {
        warn!("Target connection abandoned, its transaction is discarded when the session closes");
        return;
    }

    match target.rollback().await {
        Ok(()) => info!("Target transaction rolled back"),
        Err(source) => {
            let err = MigrateError::Transaction { source };
            error!("Rollback failed: {}", err);
            run.errors.push(err);
        }
    }
}

fn check_duplicate_tables(tables: &[TableSpec]) -> Result<(), MigrateError> {
    let mut seen = HashSet::new();

    let duplicates = tables
        .iter()
        .filter(|table| !seen.insert(table.quoted().to_lowercase()))
        .map(TableSpec::name)
        .collect::<Vec<_>>();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::Config(format!(
            "Tables listed more than once: {}",
            duplicates.join(", ")
        )))
    }
}
