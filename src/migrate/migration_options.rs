use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// What the orchestrator does after a table fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Skip remaining tables
    #[default]
    AbortOnFirstError,
    /// Attempt every table to collect all failures; the run still fails
    ContinueOnError,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::AbortOnFirstError),
            "continue" => Ok(FailurePolicy::ContinueOnError),
            other => Err(format!(
                "Unknown failure policy '{}', expected 'abort' or 'continue'",
                other
            )),
        }
    }
}

/// How the constraint gate reaches every table of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintStrategy {
    /// List base tables from INFORMATION_SCHEMA and alter each one
    #[default]
    Enumerate,
    /// Use `sp_MSforeachtable`
    ForEachProcedure,
}

impl FromStr for ConstraintStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enumerate" => Ok(ConstraintStrategy::Enumerate),
            "foreach_procedure" => Ok(ConstraintStrategy::ForEachProcedure),
            other => Err(format!(
                "Unknown constraint strategy '{}', expected 'enumerate' or 'foreach_procedure'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub batch_size: usize,
    pub operation_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    pub constraint_strategy: ConstraintStrategy,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        MigrationOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            operation_timeout: None,
            failure_policy: FailurePolicy::default(),
            constraint_strategy: ConstraintStrategy::default(),
        }
    }
}
