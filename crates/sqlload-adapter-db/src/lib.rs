#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sqlload-adapter-db
//!
//! Database adapter for bulk loading rows into a relational table.
//!
//! This crate converts loosely typed fields into SQL parameters according to
//! the destination column type, builds single-row and multi-row INSERT
//! statements, and wraps the destination connection. Driver failures are
//! classified as transient connection faults or ordinary SQL failures at the
//! point they are produced.

pub mod coercion;
pub mod connection;
#[cfg(feature = "memory")]
pub mod memory;
pub mod schema;
mod sql;
pub mod statement;
pub mod types;

pub use coercion::{Coercer, SqlParam};
pub use connection::{Connection, ConnectionConfig, ConnectionProvider, LibsqlConnection, LibsqlConnector};
#[cfg(feature = "memory")]
pub use memory::{ExecutedStatement, MemoryConnection, MemoryConnector};
pub use schema::{LibsqlSchemaResolver, SchemaResolver, StaticSchema};
pub use statement::{BoundStatement, StatementBuilder};
pub use types::{ColumnDescriptor, SqlType};

use thiserror::Error;

/// Boxed driver error kept as the source of SQL failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a failed statement, decided where the failure is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Communication or socket failure; the connection should be replaced.
    TransientConnection,
    /// Any other statement failure (constraint, syntax, type).
    Other,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransientConnection => write!(f, "transient connection fault"),
            Self::Other => write!(f, "sql failure"),
        }
    }
}

/// Errors that can occur when working with the database.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Connection error: {details}")]
    Connection { details: String },

    #[error("Libsql error during {context}: {source}")]
    Libsql {
        context: String,
        #[source]
        source: libsql::Error,
    },

    #[error("SQL error ({fault}) executing `{statement}`: {source}")]
    Sql {
        statement: String,
        fault: FaultKind,
        #[source]
        source: BoxError,
    },

    #[error("Query error on `{table}`: {details}")]
    Query { table: String, details: String },

    #[error("Schema error: {details}")]
    Schema { details: String },

    #[error(
        "Unsupported column type for column '{column}': type code {code}, type label '{label}'"
    )]
    UnsupportedType {
        column: String,
        code: i32,
        label: String,
    },

    #[error("Conversion error for column '{column}': {details}")]
    Conversion { column: String, details: String },
}

impl Error {
    /// Build a SQL failure with its classification.
    pub fn sql(
        statement: impl Into<String>,
        fault: FaultKind,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Sql {
            statement: statement.into(),
            fault,
            source: source.into(),
        }
    }

    /// Build a conversion error for one column value.
    pub fn conversion(column: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            details: details.into(),
        }
    }

    /// Fault classification for statement failures, `None` for everything else.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Sql { fault, .. } => Some(*fault),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.fault_kind() == Some(FaultKind::TransientConnection)
    }

    /// Whether the failure concerns one row only and must not abort a run.
    pub fn is_row_level(&self) -> bool {
        matches!(self, Self::Sql { .. } | Self::Conversion { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
