//! Destination connections.
//!
//! A [`ConnectionProvider`] hands out connections on demand; the loader
//! acquires one at the start of a run and replaces it after a transient
//! fault. Every statement failure leaving a [`Connection`] is already
//! classified with a [`FaultKind`].

use std::future::Future;
use std::time::Duration;

use libsql::{Builder, Connection as RawConnection, Database, params_from_iter};
use tracing::{debug, warn};

use crate::coercion::SqlParam;
use crate::sql::quote_identifier;
use crate::{Error, FaultKind, Result};

/// Message fragments that identify a broken or lost connection.
const TRANSIENT_MARKERS: &[&str] = &[
    "communications link",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "socket",
    "stream closed",
    "timed out",
];

/// A live destination connection.
pub trait Connection {
    /// Execute one statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: Vec<SqlParam>) -> impl Future<Output = Result<u64>>;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()>
    where
        Self: Sized;
}

/// Source of fresh connections, callable any number of times.
pub trait ConnectionProvider {
    type Connection: Connection;

    fn acquire(&self) -> impl Future<Output = Result<Self::Connection>>;
}

impl<P: ConnectionProvider> ConnectionProvider for &P {
    type Connection = P::Connection;

    fn acquire(&self) -> impl Future<Output = Result<Self::Connection>> {
        (**self).acquire()
    }
}

/// Connection behavior for the libsql backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database_url: String,
    pub auth_token: Option<String>,
    pub timeout_ms: u64,
    pub retry_attempts: usize,
}

impl ConnectionConfig {
    pub fn in_memory() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            auth_token: None,
            timeout_ms: 5_000,
            retry_attempts: 0,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            database_url: path.into(),
            auth_token: None,
            timeout_ms: 5_000,
            retry_attempts: 0,
        }
    }

    pub fn remote(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            database_url: url.into(),
            auth_token: Some(auth_token.into()),
            timeout_ms: 5_000,
            retry_attempts: 0,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: usize) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Opens libsql connections (local file, in-memory or remote).
///
/// Every call to [`ConnectionProvider::acquire`] opens a new database handle,
/// so an in-memory URL yields an empty database each time.
#[derive(Debug, Clone)]
pub struct LibsqlConnector {
    config: ConnectionConfig,
}

impl LibsqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn open(&self) -> Result<LibsqlConnection> {
        if self.config.timeout_ms == 0 {
            return Err(Error::Config {
                details: "timeout_ms must be greater than zero".to_string(),
            });
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let database = tokio::time::timeout(timeout, build_database(&self.config))
            .await
            .map_err(|_| Error::Connection {
                details: format!(
                    "Timed out after {}ms while opening database",
                    self.config.timeout_ms
                ),
            })??;

        let connection = database.connect().map_err(|source| Error::Libsql {
            context: "connect database".to_string(),
            source,
        })?;
        if !is_remote_url(&self.config.database_url) {
            connection
                .busy_timeout(timeout)
                .map_err(|source| Error::Libsql {
                    context: "set busy timeout".to_string(),
                    source,
                })?;
        }

        Ok(LibsqlConnection {
            _database: database,
            connection: Some(connection),
        })
    }
}

impl ConnectionProvider for LibsqlConnector {
    type Connection = LibsqlConnection;

    async fn acquire(&self) -> Result<LibsqlConnection> {
        let attempts = self.config.retry_attempts + 1;
        for attempt in 0..attempts {
            match self.open().await {
                Ok(connection) => {
                    debug!(url = %self.config.database_url, "opened connection");
                    return Ok(connection);
                }
                Err(err @ Error::Config { .. }) => return Err(err),
                Err(err) => {
                    if attempt + 1 == attempts {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "failed to open connection, retrying");
                    let delay_ms = 100 * (1_u64 << attempt.min(6));
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Err(Error::Connection {
            details: format!("Failed to connect after {attempts} attempt(s): exhausted retries"),
        })
    }
}

/// Live libsql connection.
pub struct LibsqlConnection {
    // Keep the Database alive for the lifetime of the connection.
    _database: Database,
    connection: Option<RawConnection>,
}

impl std::fmt::Debug for LibsqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlConnection")
            .field("open", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl LibsqlConnection {
    pub(crate) fn raw(&self) -> Result<&RawConnection> {
        self.connection.as_ref().ok_or_else(|| Error::Connection {
            details: "Connection is closed".to_string(),
        })
    }

    /// Run a statement without parameters, e.g. DDL.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.raw()?
            .execute_batch(sql)
            .await
            .map_err(|source| classified(sql, source))?;
        Ok(())
    }

    pub async fn table_row_count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let mut rows = self
            .raw()?
            .query(&sql, ())
            .await
            .map_err(|source| classified(&sql, source))?;
        if let Some(row) = rows.next().await.map_err(|source| classified(&sql, source))? {
            let count: i64 = row.get(0).map_err(|source| classified(&sql, source))?;
            Ok(usize::try_from(count).unwrap_or(0))
        } else {
            Ok(0)
        }
    }
}

impl Connection for LibsqlConnection {
    async fn execute(&mut self, sql: &str, params: Vec<SqlParam>) -> Result<u64> {
        let connection = self.raw().map_err(|err| {
            Error::sql(sql, FaultKind::TransientConnection, err.to_string())
        })?;
        let values: Vec<libsql::Value> = params.into_iter().map(libsql::Value::from).collect();
        connection
            .execute(sql, params_from_iter(values))
            .await
            .map_err(|source| classified(sql, source))
    }

    async fn close(mut self) {
        self.connection.take();
    }
}

/// Wrap a driver error with its fault classification.
pub(crate) fn classified(statement: &str, source: libsql::Error) -> Error {
    let fault = classify(&source);
    Error::sql(statement, fault, source)
}

fn classify(error: &libsql::Error) -> FaultKind {
    if matches!(error, libsql::Error::ConnectionFailed(_)) {
        return FaultKind::TransientConnection;
    }
    let message = error.to_string().to_ascii_lowercase();
    if TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker)) {
        FaultKind::TransientConnection
    } else {
        FaultKind::Other
    }
}

async fn build_database(config: &ConnectionConfig) -> Result<Database> {
    let url = config.database_url.trim();
    if url.is_empty() {
        return Err(Error::Config {
            details: "database_url must be provided".to_string(),
        });
    }

    if is_remote_url(url) {
        let token = config.auth_token.clone().ok_or_else(|| Error::Config {
            details: "auth_token is required for remote databases".to_string(),
        })?;
        let builder = Builder::new_remote(url.to_string(), token);
        builder.build().await.map_err(|source| Error::Libsql {
            context: "open remote database".to_string(),
            source,
        })
    } else {
        let path = url.strip_prefix("file:").unwrap_or(url);
        let builder = Builder::new_local(path);
        builder.build().await.map_err(|source| Error::Libsql {
            context: "open local database".to_string(),
            source,
        })
    }
}

fn is_remote_url(url: &str) -> bool {
    url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://")
}
