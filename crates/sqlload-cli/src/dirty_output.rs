//! JSON lines output for rejected rows.

use std::io::Write;

use serde::Serialize;
use sqlload_pipeline::{DirtyCause, DirtySink};
use sqlload_record::{Field, Row};
use tracing::{error, warn};

#[derive(Serialize)]
struct DirtyLine<'a> {
    category: &'a str,
    message: &'a str,
    fields: &'a [Field],
}

/// Writes one JSON object per rejected row.
///
/// Write failures are logged and counted; rejection itself never fails.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
    failed: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            failed: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    fn write_line(&mut self, row: &Row, cause: &DirtyCause) -> std::io::Result<()> {
        let category = cause.category.to_string();
        let line = DirtyLine {
            category: &category,
            message: &cause.message,
            fields: row.fields(),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write> DirtySink for JsonLinesSink<W> {
    fn reject(&mut self, row: Row, cause: DirtyCause) {
        warn!(category = %cause.category, "dirty row: {}", cause.message);
        match self.write_line(&row, &cause) {
            Ok(()) => self.written += 1,
            Err(err) => {
                self.failed += 1;
                error!(error = %err, "failed to record dirty row");
            }
        }
    }
}
