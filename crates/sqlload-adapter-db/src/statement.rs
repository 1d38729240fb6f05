//! INSERT statement construction.
//!
//! The column list is fixed for a run, so the statement prefix and the
//! parameterized template are built once. Single rows are bound as
//! parameters; batches are rendered as one multi-row INSERT with literal
//! values, each value going through the same coercion as a bound parameter.

use sqlload_record::Row;

use crate::coercion::{Coercer, SqlParam};
use crate::sql::quote_identifier;
use crate::types::ColumnDescriptor;
use crate::{Error, Result};

/// Parameterized statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone)]
pub struct StatementBuilder {
    table: String,
    columns: Vec<ColumnDescriptor>,
    coercer: Coercer,
    prefix: String,
    template: String,
}

impl StatementBuilder {
    /// Build the statement prefix and template for a table and its columns.
    ///
    /// Fails when the column list is empty or a column has no coercion rule.
    pub fn new(
        table: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        coercer: Coercer,
    ) -> Result<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(Error::Config {
                details: "target table name must be provided".to_string(),
            });
        }
        if columns.is_empty() {
            return Err(Error::Query {
                table,
                details: "Insert column list cannot be empty".to_string(),
            });
        }
        for column in &columns {
            Coercer::check_supported(column)?;
        }

        let names: Vec<String> = columns
            .iter()
            .map(|column| quote_identifier(&column.name))
            .collect();
        let prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            quote_identifier(&table),
            names.join(", ")
        );
        let placeholders = vec!["?"; columns.len()].join(", ");
        let template = format!("{prefix}({placeholders})");

        Ok(Self {
            table,
            columns,
            coercer,
            prefix,
            template,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Parameterized single-row template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Coerce every field of a row for its column.
    pub fn coerce_row(&self, row: &Row) -> Result<Vec<SqlParam>> {
        if row.len() != self.columns.len() {
            return Err(Error::Config {
                details: format!(
                    "row has {} fields but {} columns are configured for '{}'",
                    row.len(),
                    self.columns.len(),
                    self.table
                ),
            });
        }

        self.columns
            .iter()
            .zip(row.iter())
            .map(|(column, field)| self.coercer.coerce(column, field))
            .collect()
    }

    /// Bind a single row to the parameterized template.
    pub fn bind_row(&self, row: &Row) -> Result<BoundStatement> {
        Ok(BoundStatement {
            sql: self.template.clone(),
            params: self.coerce_row(row)?,
        })
    }

    /// Literal `(v1, v2, ...)` tuple for a row.
    pub fn render_values(&self, row: &Row) -> Result<String> {
        let literals: Vec<String> = self
            .coerce_row(row)?
            .iter()
            .map(SqlParam::to_literal)
            .collect();
        Ok(format!("({})", literals.join(", ")))
    }

    /// Fully literal single-row INSERT.
    pub fn render_row(&self, row: &Row) -> Result<String> {
        Ok(format!("{}{}", self.prefix, self.render_values(row)?))
    }

    /// One multi-row INSERT carrying every row as a literal tuple.
    pub fn render_batch(&self, rows: &[Row]) -> Result<String> {
        if rows.is_empty() {
            return Err(Error::Query {
                table: self.table.clone(),
                details: "Batch insert requires at least one row".to_string(),
            });
        }

        let mut sql = self.prefix.clone();
        for (idx, row) in rows.iter().enumerate() {
            if idx > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.render_values(row)?);
        }
        Ok(sql)
    }
}
