//! Batch writer.
//!
//! Rows are accumulated until the batch is full and then written with one
//! multi-row INSERT. When that statement fails, or a row in the batch cannot
//! be rendered, the same rows are inserted one at a time through the
//! [`RowExecutor`] and the rows that still fail go to the dirty sink. The
//! residual batch at the end of the stream always takes the per-row path.
//!
//! Every row read is either written once or rejected once. A row whose field
//! count differs from the expected column count aborts the run before that
//! row's batch is executed.

use serde::Serialize;
use sqlload_adapter_db::{
    Coercer, ColumnDescriptor, Connection, ConnectionProvider, Error as DbError, StatementBuilder,
};
use sqlload_record::Row;
use tracing::{debug, error, info, warn};

use crate::dirty::DirtySink;
use crate::executor::{RowExecutor, RowFailure};
use crate::retry::RetryPolicy;
use crate::source::RowSource;
use crate::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Options for one writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub table: String,
    /// Destination columns, in row field order
    pub columns: Vec<String>,
    pub batch_size: usize,
    /// Bind empty strings as NULL for numeric columns
    pub empty_as_null: bool,
    pub retry: RetryPolicy,
}

impl WriterOptions {
    pub fn new<I, C>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            empty_as_null: false,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_empty_as_null(mut self, empty_as_null: bool) -> Self {
        self.empty_as_null = empty_as_null;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(Error::config("target table name must be provided"));
        }
        if self.columns.is_empty() {
            return Err(Error::config("at least one destination column is required"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be greater than zero"));
        }
        Ok(())
    }
}

/// Counters accumulated over every [`BatchWriter::write`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_dirty: usize,
    pub batches_committed: usize,
    pub batches_degraded: usize,
    pub reconnects: usize,
}

pub struct BatchWriter<P, S> {
    options: WriterOptions,
    executor: RowExecutor<P>,
    sink: S,
    batch: Vec<Row>,
    stats: WriteStats,
}

impl<P, S> BatchWriter<P, S>
where
    P: ConnectionProvider,
    S: DirtySink,
{
    /// Create a writer for the configured table.
    ///
    /// `columns` must describe `options.columns` in the same order. Fails on
    /// invalid options and on columns whose type has no coercion rule.
    pub fn new(
        options: WriterOptions,
        columns: Vec<ColumnDescriptor>,
        provider: P,
        sink: S,
    ) -> Result<Self> {
        options.validate()?;
        if columns.len() != options.columns.len() {
            return Err(Error::config(format!(
                "{} column descriptors resolved for {} configured columns",
                columns.len(),
                options.columns.len()
            )));
        }

        let statements = StatementBuilder::new(
            options.table.clone(),
            columns,
            Coercer::new(options.empty_as_null),
        )?;
        let batch = Vec::with_capacity(options.batch_size);

        Ok(Self {
            executor: RowExecutor::new(provider, statements),
            options,
            sink,
            batch,
            stats: WriteStats::default(),
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Load every row of `source` through `connection`.
    ///
    /// `expected_columns` must equal the configured column count, otherwise
    /// the run fails before any row is read. The connection is closed when
    /// the run ends, whatever the outcome. A returned error means the run was
    /// aborted; rows from batches flushed before the failure stay written.
    pub async fn write<R>(
        &mut self,
        source: &mut R,
        connection: P::Connection,
        expected_columns: usize,
    ) -> Result<()>
    where
        R: RowSource + ?Sized,
    {
        info!(
            table = %self.options.table,
            batch_size = self.options.batch_size,
            columns = expected_columns,
            "starting load"
        );

        let mut connection = connection;
        let configured = self.executor.statements().columns().len();
        let outcome = if expected_columns == configured {
            self.run(source, &mut connection, expected_columns).await
        } else {
            Err(Error::config(format!(
                "{expected_columns} columns expected per row but {configured} columns are configured for '{}'",
                self.options.table
            )))
        };
        connection.close().await;
        self.batch.clear();
        self.stats.reconnects = self.executor.reconnects();

        match &outcome {
            Ok(()) => info!(
                table = %self.options.table,
                rows_read = self.stats.rows_read,
                rows_written = self.stats.rows_written,
                rows_dirty = self.stats.rows_dirty,
                batches_committed = self.stats.batches_committed,
                batches_degraded = self.stats.batches_degraded,
                reconnects = self.stats.reconnects,
                "load finished"
            ),
            Err(err) => error!(
                table = %self.options.table,
                rows_read = self.stats.rows_read,
                rows_written = self.stats.rows_written,
                error = %err,
                "load aborted"
            ),
        }
        outcome
    }

    async fn run<R>(
        &mut self,
        source: &mut R,
        connection: &mut P::Connection,
        expected_columns: usize,
    ) -> Result<()>
    where
        R: RowSource + ?Sized,
    {
        while let Some(row) = source.next_row()? {
            self.stats.rows_read += 1;
            if row.len() != expected_columns {
                return Err(Error::config(format!(
                    "row {} has {} fields but {} columns are expected",
                    self.stats.rows_read,
                    row.len(),
                    expected_columns
                )));
            }

            self.batch.push(row);
            if self.batch.len() >= self.options.batch_size {
                self.flush_batch(connection).await?;
            }
        }

        if !self.batch.is_empty() {
            let rows = std::mem::take(&mut self.batch);
            debug!(rows = rows.len(), "flushing residual rows individually");
            self.flush_rows(connection, rows).await?;
        }
        Ok(())
    }

    async fn flush_batch(&mut self, connection: &mut P::Connection) -> Result<()> {
        let rows = std::mem::take(&mut self.batch);

        let sql = match self.executor.statements().render_batch(&rows) {
            Ok(sql) => sql,
            Err(err) if err.is_row_level() => {
                warn!(
                    table = %self.options.table,
                    rows = rows.len(),
                    error = %err,
                    "batch could not be rendered, inserting rows individually"
                );
                self.stats.batches_degraded += 1;
                return self.flush_rows(connection, rows).await;
            }
            Err(err) => {
                return Err(Error::Write {
                    table: self.options.table.clone(),
                    statement: self.executor.statements().template().to_string(),
                    source: err,
                });
            }
        };

        debug!(sql = %sql, rows = rows.len(), "executing batch insert");
        match connection.execute(&sql, Vec::new()).await {
            Ok(_) => {
                self.stats.rows_written += rows.len();
                self.stats.batches_committed += 1;
                Ok(())
            }
            Err(err @ DbError::Sql { .. }) => {
                warn!(
                    table = %self.options.table,
                    rows = rows.len(),
                    sql = %sql,
                    error = %err,
                    "batch insert failed, inserting rows individually"
                );
                self.stats.batches_degraded += 1;
                self.flush_rows(connection, rows).await
            }
            Err(err) => Err(Error::Write {
                table: self.options.table.clone(),
                statement: sql,
                source: err,
            }),
        }
    }

    async fn flush_rows(&mut self, connection: &mut P::Connection, rows: Vec<Row>) -> Result<()> {
        for row in rows {
            match self
                .executor
                .insert_with_retry(connection, &row, &self.options.retry)
                .await
            {
                Ok(_) => self.stats.rows_written += 1,
                Err(RowFailure::Fatal(err)) => {
                    return Err(Error::Write {
                        table: self.options.table.clone(),
                        statement: self.executor.statements().template().to_string(),
                        source: err,
                    });
                }
                Err(failure) => {
                    let cause = failure.dirty_cause();
                    warn!(
                        table = %self.options.table,
                        category = %cause.category,
                        error = %cause.message,
                        "row rejected"
                    );
                    self.stats.rows_dirty += 1;
                    self.sink.reject(row, cause);
                }
            }
        }
        Ok(())
    }
}
