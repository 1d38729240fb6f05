#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sqlload-pipeline
//!
//! Batch writer orchestration for bulk loads.
//!
//! Rows pulled from a [`RowSource`] are buffered into fixed-size batches and
//! written with one multi-row INSERT. A failing batch is replayed row by row,
//! each row guarded by a [`RetryPolicy`] that reconnects after transient
//! connection faults. Rows that cannot be written end up in a [`DirtySink`].

pub mod dirty;
pub mod executor;
pub mod retry;
pub mod source;
pub mod writer;

pub use dirty::{CollectingSink, DirtyCategory, DirtyCause, DirtyRecord, DirtySink, LoggingSink};
pub use executor::{RowExecutor, RowFailure};
pub use retry::{Backoff, Classify, Operation, RetryPolicy};
pub use source::{RowIter, RowSource};
pub use writer::{BatchWriter, WriteStats, WriterOptions};

use thiserror::Error;

/// Errors that abort a load run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error(transparent)]
    Db(#[from] sqlload_adapter_db::Error),

    #[error("Write to '{table}' failed executing `{statement}`: {source}")]
    Write {
        table: String,
        statement: String,
        #[source]
        source: sqlload_adapter_db::Error,
    },

    #[error("Source error: {details}")]
    Source { details: String },
}

impl Error {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
