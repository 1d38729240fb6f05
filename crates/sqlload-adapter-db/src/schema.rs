//! Destination column metadata.

use std::collections::HashMap;
use std::future::Future;

use crate::connection::{LibsqlConnection, classified};
use crate::sql::quote_identifier;
use crate::types::ColumnDescriptor;
use crate::{Error, Result};

/// Looks up the descriptors of the configured columns of a table.
pub trait SchemaResolver {
    /// Descriptors in the order of `columns`.
    fn describe(
        &self,
        table: &str,
        columns: &[String],
    ) -> impl Future<Output = Result<Vec<ColumnDescriptor>>>;
}

/// Reads column types with `PRAGMA table_info`.
#[derive(Debug)]
pub struct LibsqlSchemaResolver<'a> {
    connection: &'a LibsqlConnection,
}

impl<'a> LibsqlSchemaResolver<'a> {
    pub fn new(connection: &'a LibsqlConnection) -> Self {
        Self { connection }
    }

    /// Every column of the table in declaration order.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let mut rows = self
            .connection
            .raw()?
            .query(&sql, ())
            .await
            .map_err(|source| classified(&sql, source))?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next().await.map_err(|source| classified(&sql, source))? {
            let name: String = row.get(1).map_err(|source| classified(&sql, source))?;
            let label: String = row.get(2).map_err(|source| classified(&sql, source))?;
            columns.push(ColumnDescriptor::from_label(name, label));
        }

        if columns.is_empty() {
            return Err(Error::Schema {
                details: format!("table '{table}' does not exist or has no columns"),
            });
        }
        Ok(columns)
    }
}

impl SchemaResolver for LibsqlSchemaResolver<'_> {
    async fn describe(&self, table: &str, columns: &[String]) -> Result<Vec<ColumnDescriptor>> {
        let available = self.table_columns(table).await?;
        select_columns(table, &available, columns)
    }
}

/// Descriptors declared up front, e.g. from a job file.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: HashMap<String, Vec<ColumnDescriptor>>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table from `(column, type label)` pairs.
    pub fn with_table<I, N, L>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<String>,
        L: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, label)| ColumnDescriptor::from_label(name, label))
            .collect();
        self.tables.insert(table.into(), columns);
        self
    }
}

impl SchemaResolver for StaticSchema {
    async fn describe(&self, table: &str, columns: &[String]) -> Result<Vec<ColumnDescriptor>> {
        let available = self.tables.get(table).ok_or_else(|| Error::Schema {
            details: format!("no columns declared for table '{table}'"),
        })?;
        select_columns(table, available, columns)
    }
}

fn select_columns(
    table: &str,
    available: &[ColumnDescriptor],
    columns: &[String],
) -> Result<Vec<ColumnDescriptor>> {
    if columns.is_empty() {
        return Ok(available.to_vec());
    }

    columns
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|column| column.name.eq_ignore_ascii_case(name))
                .map(|column| ColumnDescriptor {
                    name: name.clone(),
                    ..column.clone()
                })
                .ok_or_else(|| Error::Schema {
                    details: format!("column '{name}' not found in table '{table}'"),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionProvider, LibsqlConnector};
    use crate::types::SqlType;

    #[tokio::test]
    async fn test_static_schema_keeps_requested_order() {
        let schema = StaticSchema::new().with_table(
            "orders",
            [("id", "INTEGER"), ("name", "VARCHAR(20)"), ("placed", "DATE")],
        );
        let columns = schema
            .describe("orders", &["placed".to_string(), "ID".to_string()])
            .await
            .unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].sql_type, SqlType::Date);
        assert_eq!(columns[1].name, "ID");
        assert_eq!(columns[1].sql_type, SqlType::Integer);
    }

    #[tokio::test]
    async fn test_static_schema_missing_column() {
        let schema = StaticSchema::new().with_table("orders", [("id", "INTEGER")]);
        let err = schema
            .describe("orders", &["missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[tokio::test]
    async fn test_libsql_schema() {
        let connector = LibsqlConnector::new(ConnectionConfig::in_memory());
        let connection = connector.acquire().await.unwrap();
        connection
            .execute_batch("CREATE TABLE people (id INTEGER, name VARCHAR(40), born DATE, payload BLOB)")
            .await
            .unwrap();

        let resolver = LibsqlSchemaResolver::new(&connection);
        let all = resolver.describe("people", &[]).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].sql_type, SqlType::Other(SqlType::BLOB_CODE));

        let picked = resolver
            .describe("people", &["born".to_string(), "name".to_string()])
            .await
            .unwrap();
        assert_eq!(picked[0].sql_type, SqlType::Date);
        assert_eq!(picked[1].sql_type, SqlType::VarChar);
        assert_eq!(picked[1].type_label, "VARCHAR(40)");

        assert!(matches!(
            resolver.describe("absent", &[]).await,
            Err(Error::Schema { .. })
        ));
    }
}
