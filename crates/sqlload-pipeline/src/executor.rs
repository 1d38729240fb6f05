//! Single-row inserts with connection recovery.
//!
//! A transient connection fault replaces the caller's connection in place
//! before the failure is reported as retryable, so the next attempt runs on
//! a fresh connection.

use std::fmt;

use sqlload_adapter_db::{
    Connection, ConnectionProvider, Error as DbError, FaultKind, StatementBuilder,
};
use sqlload_record::Row;
use tracing::{debug, warn};

use crate::dirty::{DirtyCategory, DirtyCause};
use crate::retry::{Classify, Operation, RetryPolicy};

/// Outcome of a failed row insert.
#[derive(Debug)]
pub enum RowFailure {
    /// Transient connection fault; the connection has been replaced
    Retryable(DbError),
    /// The row itself cannot be written
    Rejected(DbError),
    /// Failure that ends the whole run
    Fatal(DbError),
}

impl RowFailure {
    pub fn error(&self) -> &DbError {
        match self {
            Self::Retryable(err) | Self::Rejected(err) | Self::Fatal(err) => err,
        }
    }

    pub fn into_error(self) -> DbError {
        match self {
            Self::Retryable(err) | Self::Rejected(err) | Self::Fatal(err) => err,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Dirty record cause for a non-fatal failure.
    pub fn dirty_cause(&self) -> DirtyCause {
        let category = match self {
            Self::Retryable(_) => DirtyCategory::ConnectionExhausted,
            Self::Rejected(DbError::Conversion { .. }) => DirtyCategory::Conversion,
            Self::Rejected(_) | Self::Fatal(_) => DirtyCategory::Rejected,
        };
        DirtyCause::new(category, self.error().to_string())
    }
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable(err) => write!(f, "retryable: {err}"),
            Self::Rejected(err) => write!(f, "rejected: {err}"),
            Self::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

impl std::error::Error for RowFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

impl Classify for RowFailure {
    fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Retryable(_) => Some(FaultKind::TransientConnection),
            Self::Rejected(err) => err.fault_kind(),
            Self::Fatal(_) => None,
        }
    }
}

/// Executes one row at a time on a caller-owned connection.
#[derive(Debug)]
pub struct RowExecutor<P> {
    provider: P,
    statements: StatementBuilder,
    reconnects: usize,
}

impl<P: ConnectionProvider> RowExecutor<P> {
    pub fn new(provider: P, statements: StatementBuilder) -> Self {
        Self {
            provider,
            statements,
            reconnects: 0,
        }
    }

    pub fn statements(&self) -> &StatementBuilder {
        &self.statements
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Connections replaced after transient faults.
    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    /// Insert one row with a single attempt.
    pub async fn insert(&mut self, connection: &mut P::Connection, row: &Row) -> Result<u64, RowFailure> {
        let statement = self.statements.bind_row(row).map_err(|err| {
            if err.is_row_level() {
                RowFailure::Rejected(err)
            } else {
                RowFailure::Fatal(err)
            }
        })?;

        debug!(sql = %statement.sql, params = ?statement.params, "executing row insert");
        match connection.execute(&statement.sql, statement.params).await {
            Ok(changed) => Ok(changed),
            Err(err) if err.is_transient() => {
                self.reconnect(connection).await;
                Err(RowFailure::Retryable(err))
            }
            Err(err) if err.is_row_level() => Err(RowFailure::Rejected(err)),
            Err(err) => Err(RowFailure::Fatal(err)),
        }
    }

    /// Insert one row, retrying according to `policy`.
    pub async fn insert_with_retry(
        &mut self,
        connection: &mut P::Connection,
        row: &Row,
        policy: &RetryPolicy,
    ) -> Result<u64, RowFailure> {
        let mut operation = RowInsert {
            executor: self,
            connection,
            row,
        };
        policy.run(&mut operation).await
    }

    async fn reconnect(&mut self, connection: &mut P::Connection) {
        match self.provider.acquire().await {
            Ok(fresh) => {
                let stale = std::mem::replace(connection, fresh);
                stale.close().await;
                self.reconnects += 1;
                warn!(reconnects = self.reconnects, "replaced broken connection");
            }
            Err(err) => {
                warn!(error = %err, "reconnect failed, next attempt will try again");
            }
        }
    }
}

struct RowInsert<'a, P: ConnectionProvider> {
    executor: &'a mut RowExecutor<P>,
    connection: &'a mut P::Connection,
    row: &'a Row,
}

impl<P: ConnectionProvider> Operation for RowInsert<'_, P> {
    type Output = u64;
    type Error = RowFailure;

    async fn attempt(&mut self) -> Result<u64, RowFailure> {
        self.executor.insert(&mut *self.connection, self.row).await
    }
}
