use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_tiberius::ConnectionManager;
use tiberius::{AuthMethod, Config, EncryptionLevel, ToSql};

use crate::common::schema::{ColumnList, RowSet, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::{DbError, Role};

/// A live handle to one database.
///
/// Parameters are positional and referenced as `@P1`, `@P2`, ... in the
/// statement text.
#[async_trait]
pub trait SqlConnection: Send {
    /// Runs a statement and returns its first result set with column metadata.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError>;

    /// Runs a statement that returns no rows. Returns the affected row count
    /// when the driver reports one.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    async fn begin(&mut self) -> Result<(), DbError> {
        self.execute("BEGIN TRANSACTION", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.execute("COMMIT TRANSACTION", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.execute("ROLLBACK TRANSACTION", &[]).await.map(|_| ())
    }
}

/// Supplies ready-to-use connections for a database configuration.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: SqlConnection;

    async fn connect(
        &self,
        config: &DatabaseConfig,
        role: Role,
    ) -> Result<Self::Connection, DbError>;
}

/// Runs `operation`, failing with [`DbError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Option<Duration>, operation: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| DbError::Timeout(limit))?,
        None => operation.await,
    }
}

/// Wraps a connection so every call is subject to the same timeout.
///
/// A timeout drops the driver future mid-request, leaving the session's
/// protocol state unknown. The connection is then abandoned: every later
/// call fails with [`DbError::Abandoned`] without reaching the server.
pub struct BoundedConnection<C> {
    inner: C,
    limit: Option<Duration>,
    abandoned: bool,
}

impl<C: SqlConnection> BoundedConnection<C> {
    pub fn new(inner: C, limit: Option<Duration>) -> Self {
        BoundedConnection {
            inner,
            limit,
            abandoned: false,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn ensure_usable(&self) -> Result<(), DbError> {
        if self.abandoned {
            return Err(DbError::Abandoned);
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, DbError>) -> Result<T, DbError> {
        if let Err(DbError::Timeout(_)) = &result {
            self.abandoned = true;
        }
        result
    }
}

#[async_trait]
impl<C: SqlConnection> SqlConnection for BoundedConnection<C> {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
        self.ensure_usable()?;
        let result = bounded(self.limit, self.inner.query(sql, params)).await;
        self.track(result)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.ensure_usable()?;
        let result = bounded(self.limit, self.inner.execute(sql, params)).await;
        self.track(result)
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.ensure_usable()?;
        let result = bounded(self.limit, self.inner.begin()).await;
        self.track(result)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_usable()?;
        let result = bounded(self.limit, self.inner.commit()).await;
        self.track(result)
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.ensure_usable()?;
        let result = bounded(self.limit, self.inner.rollback()).await;
        self.track(result)
    }
}

/// SQL Server connection backed by a single-slot `bb8` pool.
///
/// Statements without parameters go out as plain SQL batches so that
/// session state (`SET IDENTITY_INSERT`, open transactions) survives between
/// calls. Parameterized statements run through the driver's RPC path, which
/// executes inside that same session.
pub struct TiberiusConnection {
    conn: PooledConnection<'static, ConnectionManager>,
}

#[async_trait]
impl SqlConnection for TiberiusConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
        let param_refs = as_params(params);

        let mut stream = if params.is_empty() {
            self.conn.simple_query(sql).await?
        } else {
            self.conn.query(sql, &param_refs).await?
        };

        let columns = stream
            .columns()
            .await?
            .map(|columns| {
                columns
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await?
            .into_iter()
            .map(|row| row.into_iter().map(SqlValue::from).collect())
            .collect();

        RowSet::new(ColumnList::new(columns), rows).map_err(DbError::UnexpectedResult)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        if params.is_empty() {
            self.conn.simple_query(sql).await?.into_results().await?;
            return Ok(0);
        }

        let param_refs = as_params(params);
        let result = self.conn.execute(sql, &param_refs).await?;

        Ok(result.total())
    }
}

fn as_params(params: &[SqlValue]) -> Vec<&dyn ToSql> {
    params.iter().map(|param| param as &dyn ToSql).collect()
}

/// Opens SQL Server connections with `tiberius`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusProvider;

#[async_trait]
impl ConnectionProvider for TiberiusProvider {
    type Connection = TiberiusConnection;

    async fn connect(
        &self,
        config: &DatabaseConfig,
        role: Role,
    ) -> Result<TiberiusConnection, DbError> {
        debug!(
            "Connecting to {} database {} at {}:{}",
            role, config.database, config.host, config.port
        );

        let mut tiberius_config = Config::new();
        tiberius_config.host(&config.host);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        tiberius_config.encryption(if config.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        if config.trust_server_certificate {
            tiberius_config.trust_cert();
        }

        // The connection is opened by `build`, so login and network failures
        // surface here instead of being retried in the background
        let mgr = ConnectionManager::new(tiberius_config);
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .retry_connection(false)
            .build(mgr)
            .await?;

        let conn = pool
            .get_owned()
            .await
            .map_err(|err| map_pool_error(err, role))?;

        Ok(TiberiusConnection { conn })
    }
}

fn map_pool_error(err: RunError<tiberius::error::Error>, role: Role) -> DbError {
    match err {
        RunError::User(err) => DbError::Driver(err),
        RunError::TimedOut => DbError::Pool(format!("Timed out connecting to {} database", role)),
    }
}
