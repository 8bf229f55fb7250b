//! In-memory stand-ins for SQL Server connections, used by unit tests.
//!
//! The fake understands exactly the statements this crate issues and keeps a
//! shared log plus a transactional view of inserted rows so tests can assert
//! ordering and durability after the connection has been moved.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tiberius::ColumnData;

use crate::common::schema::{ColumnList, Row, RowSet, SqlValue};
use crate::config::DatabaseConfig;
use crate::connection::{ConnectionProvider, SqlConnection};
use crate::error::{DbError, Role};

pub fn int(value: i32) -> SqlValue {
    SqlValue::new(ColumnData::I32(Some(value)))
}

pub fn int_row(values: &[i32]) -> Row {
    values.iter().map(|value| int(*value)).collect()
}

pub fn text(value: &str) -> SqlValue {
    SqlValue::new(ColumnData::String(Some(value.to_string().into())))
}

#[derive(Default)]
struct FakeState {
    statements: Vec<String>,
    source_tables: HashMap<String, RowSet>,
    database_tables: Vec<String>,
    identity_tables: HashSet<String>,
    existing_tables: HashSet<String>,
    failures: Vec<(String, String)>,
    stalls: Vec<String>,
    in_transaction: bool,
    staged: HashMap<String, Vec<Row>>,
    durable: HashMap<String, Vec<Row>>,
}

/// Cloneable view of a fake connection's state.
#[derive(Clone, Default)]
pub struct FakeLog {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLog {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Position of the first statement containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lock()
            .statements
            .iter()
            .position(|sql| sql.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lock()
            .statements
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    pub fn durable_rows(&self, table: &str) -> Vec<Row> {
        self.lock().durable.get(table).cloned().unwrap_or_default()
    }

    /// Rows the session itself would see, committed or not.
    pub fn visible_rows(&self, table: &str) -> Vec<Row> {
        let state = self.lock();
        let mut rows = state.durable.get(table).cloned().unwrap_or_default();
        rows.extend(state.staged.get(table).cloned().unwrap_or_default());
        rows
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }
}

#[derive(Default)]
pub struct FakeConnection {
    log: FakeLog,
}

impl FakeConnection {
    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }

    /// Source table served to `SELECT * FROM [name]`.
    pub fn with_table(&mut self, name: &str, columns: &[&str], rows: Vec<Row>) -> &mut Self {
        let columns = ColumnList::new(columns.iter().map(|c| c.to_string()).collect());
        let row_set = RowSet::new(columns, rows).unwrap();
        self.log
            .lock()
            .source_tables
            .insert(format!("[{}]", name), row_set);
        self
    }

    pub fn with_database_tables(&mut self, tables: &[&str]) -> &mut Self {
        self.log.lock().database_tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_identity_table(&mut self, quoted: &str) -> &mut Self {
        self.log.lock().identity_tables.insert(quoted.to_string());
        self
    }

    pub fn with_existing_table(&mut self, quoted: &str) -> &mut Self {
        self.log.lock().existing_tables.insert(quoted.to_string());
        self
    }

    /// Every statement containing `needle` fails with `message`.
    pub fn fail_on(&mut self, needle: &str, message: &str) -> &mut Self {
        self.log
            .lock()
            .failures
            .push((needle.to_string(), message.to_string()));
        self
    }

    /// Every statement containing `needle` hangs.
    pub fn stall_on(&mut self, needle: &str) -> &mut Self {
        self.log.lock().stalls.push(needle.to_string());
        self
    }

    /// Records `sql` and applies configured stalls and failures.
    async fn accept(&self, sql: &str) -> Result<(), DbError> {
        let (stall, failure) = {
            let mut state = self.log.lock();
            state.statements.push(sql.to_string());
            let stall = state.stalls.iter().any(|needle| sql.contains(needle.as_str()));
            let failure = state
                .failures
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()))
                .map(|(_, message)| message.clone());
            (stall, failure)
        };

        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        match failure {
            Some(message) => Err(DbError::Other(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlConnection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
        self.accept(sql).await?;
        let state = self.log.lock();

        if let Some(table) = sql.strip_prefix("SELECT * FROM ") {
            return state
                .source_tables
                .get(table)
                .cloned()
                .ok_or_else(|| DbError::Other(format!("Invalid object name '{}'", table)));
        }

        if sql.contains("TableHasIdentity") {
            let table = match params.first().map(|p| p.data()) {
                Some(ColumnData::String(Some(name))) => name.to_string(),
                _ => return Err(DbError::Other("missing table parameter".into())),
            };
            let flag = if state.identity_tables.contains(&table) {
                Some(1)
            } else if state.existing_tables.contains(&table) {
                Some(0)
            } else {
                None
            };
            let columns = ColumnList::new(vec!["HAS_IDENTITY".into()]);
            let rows = vec![vec![SqlValue::new(ColumnData::I32(flag))]];
            return RowSet::new(columns, rows).map_err(DbError::UnexpectedResult);
        }

        if sql.contains("INFORMATION_SCHEMA.TABLES") {
            let columns = ColumnList::new(vec!["TABLE_NAME".into()]);
            let rows = state.database_tables.iter().map(|t| vec![text(t)]).collect();
            return RowSet::new(columns, rows).map_err(DbError::UnexpectedResult);
        }

        Err(DbError::Other(format!("Unexpected query: {}", sql)))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.accept(sql).await?;
        let mut state = self.log.lock();

        match sql {
            "BEGIN TRANSACTION" => {
                state.in_transaction = true;
                return Ok(0);
            }
            "COMMIT TRANSACTION" => {
                let staged = std::mem::take(&mut state.staged);
                for (table, rows) in staged {
                    state.durable.entry(table).or_default().extend(rows);
                }
                state.in_transaction = false;
                return Ok(0);
            }
            "ROLLBACK TRANSACTION" => {
                state.staged.clear();
                state.in_transaction = false;
                return Ok(0);
            }
            _ => {}
        }

        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let (table, rest) = rest
                .split_once(" (")
                .ok_or_else(|| DbError::Other(format!("Malformed insert: {}", sql)))?;
            let column_list = rest.split_once(')').map(|(cols, _)| cols).unwrap_or_default();
            let width = column_list.split(", ").count();
            let rows: Vec<Row> = params.chunks(width).map(|row| row.to_vec()).collect();
            let count = rows.len() as u64;

            let target = if state.in_transaction {
                &mut state.staged
            } else {
                &mut state.durable
            };
            target.entry(table.to_string()).or_default().extend(rows);

            return Ok(count);
        }

        Ok(0)
    }
}

/// Hands out pre-built fake connections, or fails for a role.
#[derive(Default)]
pub struct FakeProvider {
    source: Mutex<Option<FakeConnection>>,
    target: Mutex<Option<FakeConnection>>,
}

impl FakeProvider {
    pub fn new(source: FakeConnection, target: FakeConnection) -> Self {
        FakeProvider {
            source: Mutex::new(Some(source)),
            target: Mutex::new(Some(target)),
        }
    }

    /// Provider whose `role` connection is unreachable.
    pub fn unreachable(role: Role, other: FakeConnection) -> Self {
        match role {
            Role::Source => FakeProvider {
                source: Mutex::new(None),
                target: Mutex::new(Some(other)),
            },
            Role::Target => FakeProvider {
                source: Mutex::new(Some(other)),
                target: Mutex::new(None),
            },
        }
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        config: &DatabaseConfig,
        role: Role,
    ) -> Result<FakeConnection, DbError> {
        let slot = match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        };

        slot.lock().unwrap().take().ok_or_else(|| {
            DbError::Other(format!("Login failed for user '{}'", config.username))
        })
    }
}

pub fn database_config(host: &str) -> DatabaseConfig {
    DatabaseConfig {
        host: host.to_string(),
        port: 1433,
        username: "sa".to_string(),
        password: "secret".to_string(),
        database: "Bdplaner".to_string(),
        encrypt: false,
        trust_server_certificate: false,
    }
}
