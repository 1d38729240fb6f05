//! Dirty record routing.
//!
//! Rows that cannot be persisted are handed to a [`DirtySink`] together with
//! the reason. Sinks never fail; a sink that writes somewhere fallible has to
//! deal with its own errors.

use std::fmt;

use serde::Serialize;
use sqlload_record::Row;
use tracing::warn;

/// Why a row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyCategory {
    /// A field could not be converted to its column type
    Conversion,
    /// The destination refused the row
    Rejected,
    /// Transient connection faults outlasted the retry ceiling
    ConnectionExhausted,
}

impl fmt::Display for DirtyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversion => write!(f, "conversion"),
            Self::Rejected => write!(f, "rejected"),
            Self::ConnectionExhausted => write!(f, "connection_exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtyCause {
    pub category: DirtyCategory,
    pub message: String,
}

impl DirtyCause {
    pub fn new(category: DirtyCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for DirtyCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// A row permanently rejected from persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirtyRecord {
    pub row: Row,
    pub cause: DirtyCause,
}

pub trait DirtySink {
    fn reject(&mut self, row: Row, cause: DirtyCause);
}

impl<S: DirtySink + ?Sized> DirtySink for &mut S {
    fn reject(&mut self, row: Row, cause: DirtyCause) {
        (**self).reject(row, cause);
    }
}

impl<S: DirtySink + ?Sized> DirtySink for Box<S> {
    fn reject(&mut self, row: Row, cause: DirtyCause) {
        (**self).reject(row, cause);
    }
}

/// Keeps every dirty record in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    records: Vec<DirtyRecord>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[DirtyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<DirtyRecord> {
        self.records
    }
}

impl DirtySink for CollectingSink {
    fn reject(&mut self, row: Row, cause: DirtyCause) {
        self.records.push(DirtyRecord { row, cause });
    }
}

/// Logs dirty rows and drops them.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink {
    rejected: usize,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

impl DirtySink for LoggingSink {
    fn reject(&mut self, row: Row, cause: DirtyCause) {
        self.rejected += 1;
        warn!(category = %cause.category, fields = ?row.fields(), "dirty row: {}", cause.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlload_record::row;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.reject(row!["a"], DirtyCause::new(DirtyCategory::Conversion, "bad"));
        sink.reject(row!["b"], DirtyCause::new(DirtyCategory::Rejected, "dup"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[0].row, row!["a"]);
        assert_eq!(sink.records()[1].cause.category, DirtyCategory::Rejected);
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn DirtySink> = Box::new(LoggingSink::new());
        sink.reject(row![1_i64], DirtyCause::new(DirtyCategory::ConnectionExhausted, "gone"));
    }

    #[test]
    fn test_cause_display() {
        let cause = DirtyCause::new(DirtyCategory::ConnectionExhausted, "link down");
        assert_eq!(cause.to_string(), "connection_exhausted: link down");
    }
}
