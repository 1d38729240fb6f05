use std::time::Duration;

use sqlload_adapter_db::{
    ConnectionConfig, ConnectionProvider, LibsqlConnector, LibsqlSchemaResolver, SchemaResolver,
};
use sqlload_pipeline::{BatchWriter, CollectingSink, DirtyCategory, RetryPolicy, RowIter, WriterOptions};
use sqlload_record::{Row, row};

async fn setup(dir: &tempfile::TempDir) -> anyhow::Result<LibsqlConnector> {
    let path = dir.path().join("orders.db");
    let connector = LibsqlConnector::new(ConnectionConfig::local(path.to_string_lossy()));
    let connection = connector.acquire().await?;
    connection
        .execute_batch(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer VARCHAR(40) NOT NULL,
                placed DATE,
                total DOUBLE,
                paid BOOLEAN
            )",
        )
        .await?;
    Ok(connector)
}

#[tokio::test]
async fn test_load_into_libsql() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = setup(&dir).await?;
    let columns: Vec<String> = ["id", "customer", "placed", "total", "paid"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let schema_connection = connector.acquire().await?;
    let descriptors = LibsqlSchemaResolver::new(&schema_connection)
        .describe("orders", &columns)
        .await?;

    let options = WriterOptions::new("orders", columns.clone())
        .with_batch_size(3)
        .with_empty_as_null(true)
        .with_retry(RetryPolicy::default().with_delay(Duration::ZERO));
    let mut writer = BatchWriter::new(options, descriptors, &connector, CollectingSink::new())?;

    let rows: Vec<Row> = vec![
        row!["1", "Acme", "2024-01-02", "10.5", "true"],
        row!["2", "Globex", "", "", "false"],
        // duplicate key: the batch degrades and this row is rejected
        row!["1", "Initech", "2024-01-03", "1", "true"],
        row!["4", "Umbrella", "yesterday", "3", "false"],
        row!["5", "Hooli", "2024/02/01", "7.25", "TRUE"],
        row!["6", None::<String>, "2024-02-02", "1", "false"],
        row!["7", "Stark", "20240203", "2", "false"],
    ];

    let connection = connector.acquire().await?;
    writer.write(&mut RowIter::new(rows), connection, 5).await?;

    let stats = writer.stats();
    assert_eq!(stats.rows_read, 7);
    assert_eq!(stats.rows_written, 4);
    assert_eq!(stats.rows_dirty, 3);
    assert_eq!(stats.batches_degraded, 2);

    let categories: Vec<_> = writer
        .sink()
        .records()
        .iter()
        .map(|record| record.cause.category)
        .collect();
    assert_eq!(
        categories,
        vec![
            DirtyCategory::Rejected,
            DirtyCategory::Conversion,
            DirtyCategory::Rejected
        ]
    );

    assert_eq!(schema_connection.table_row_count("orders").await?, 4);
    schema_connection
        .execute_batch("CREATE TABLE checked AS SELECT id FROM orders WHERE placed = '2024-02-01' AND paid = 1")
        .await?;
    assert_eq!(schema_connection.table_row_count("checked").await?, 1);
    Ok(())
}
