//! CSV row source.

use std::io::Read;

use sqlload_pipeline::{Error, Result, RowSource};
use sqlload_record::{Field, Row};
use tracing::trace;

use crate::config::SourceSection;

/// Streams CSV records as rows of string fields.
///
/// Records may have any number of fields; the writer decides whether the
/// arity is acceptable.
pub struct CsvRowSource<R: Read> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    null_marker: Option<String>,
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(reader: R, config: &SourceSection) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter as u8)
            .has_headers(config.has_header)
            .flexible(true)
            .from_reader(reader);
        Self {
            reader,
            record: csv::StringRecord::new(),
            null_marker: config.null_marker.clone(),
        }
    }

    fn field(&self, value: &str) -> Field {
        match &self.null_marker {
            Some(marker) if marker == value => Field::Null,
            _ => Field::from(value),
        }
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|err| Error::Source {
                details: format!("failed to read CSV record: {err}"),
            })?;
        if !more {
            return Ok(None);
        }

        let row: Row = self.record.iter().map(|value| self.field(value)).collect();
        trace!(line = self.record.position().map(|p| p.line()), fields = row.len(), "read CSV row");
        Ok(Some(row))
    }
}
