//! Upstream row sources.

use sqlload_record::Row;

use crate::Result;

/// Pull-based stream of rows.
pub trait RowSource {
    /// Next row, or `None` once the stream is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

/// Adapts any iterator of rows.
#[derive(Debug, Clone)]
pub struct RowIter<I> {
    rows: I,
}

impl<I: Iterator<Item = Row>> RowIter<I> {
    pub fn new(rows: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Row>> RowSource for RowIter<I> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}
