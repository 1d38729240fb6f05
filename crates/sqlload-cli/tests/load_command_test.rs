use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use sqlload_adapter_db::{Connection, ConnectionConfig, ConnectionProvider, LibsqlConnector};

fn run_sqlload(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqlload"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run sqlload")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

async fn create_orders_db(dir: &Path) -> PathBuf {
    let path = dir.join("orders.db");
    let connector = LibsqlConnector::new(ConnectionConfig::local(path.to_string_lossy()));
    let connection = connector.acquire().await.expect("open database");
    connection
        .execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer VARCHAR(40), placed DATE)",
        )
        .await
        .expect("create table");
    connection.close().await;
    path
}

async fn count_orders(db: &Path) -> usize {
    let connector = LibsqlConnector::new(ConnectionConfig::local(db.to_string_lossy()));
    let connection = connector.acquire().await.expect("open database");
    connection
        .table_row_count("orders")
        .await
        .expect("count rows")
}

fn write_job(dir: &Path, db: &Path, input: &Path, extra: &str) -> PathBuf {
    let job = format!(
        "database:\n  url: {}\ntarget:\n  table: orders\n  columns: [id, customer, placed]\nwriter:\n  retry_delay_ms: 0\nsource:\n  path: {}\n{extra}",
        db.display(),
        input.display()
    );
    let path = dir.join("job.yaml");
    fs::write(&path, job).expect("write job file");
    path
}

#[tokio::test]
async fn test_load_command_writes_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let input = dir.path().join("orders.csv");
    fs::write(
        &input,
        "id,customer,placed\n1,Acme,2024-01-02\n2,Globex,\n3,\"Initech, Inc\",2024/03/04\n",
    )
    .unwrap();
    let job = write_job(dir.path(), &db, &input, "");

    let output = run_sqlload(&["load", "--config", job.to_str().unwrap(), "--batch-size", "2"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary = stdout(&output);
    assert!(summary.contains("rows read: 3"), "{summary}");
    assert!(summary.contains("rows written: 3"), "{summary}");
    assert!(summary.contains("rows dirty: 0"), "{summary}");
    assert!(summary.contains("batches committed: 1"), "{summary}");
    assert_eq!(count_orders(&db).await, 3);
}

#[tokio::test]
async fn test_dirty_rows_are_written_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let input = dir.path().join("orders.csv");
    fs::write(
        &input,
        "id,customer,placed\n1,Acme,2024-01-02\nx,Bad,2024-01-02\n3,Late,someday\n1,Dup,\n5,Fine,\n",
    )
    .unwrap();
    let dirty = dir.path().join("dirty.jsonl");
    let job = write_job(
        dir.path(),
        &db,
        &input,
        &format!("dirty_output: {}\n", dirty.display()),
    );

    let output = run_sqlload(&["load", "-c", job.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("rows dirty: 3"));
    assert_eq!(count_orders(&db).await, 2);

    let lines: Vec<String> = fs::read_to_string(&dirty)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("\"category\":\"conversion\""));
    assert!(lines[1].contains("DATE conversion failed: [someday]"));
    assert!(lines[2].contains("\"category\":\"rejected\""));
}

#[tokio::test]
async fn test_input_argument_overrides_job_source() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let missing = dir.path().join("missing.csv");
    let job = write_job(dir.path(), &db, &missing, "");
    let input = dir.path().join("other.csv");
    fs::write(&input, "id,customer,placed\n9,Override,\n").unwrap();

    let output = run_sqlload(&[
        "load",
        "--config",
        job.to_str().unwrap(),
        input.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(count_orders(&db).await, 1);
}

#[tokio::test]
async fn test_arity_mismatch_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let input = dir.path().join("orders.csv");
    fs::write(&input, "id,customer,placed\n1,Acme,2024-01-02\n2,Short\n").unwrap();
    let job = write_job(dir.path(), &db, &input, "");

    let output = run_sqlload(&["load", "--config", job.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Configuration error"), "{}", stderr(&output));
    assert_eq!(count_orders(&db).await, 0);
}

#[tokio::test]
async fn test_unknown_column_fails_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let input = dir.path().join("orders.csv");
    fs::write(&input, "id\n1\n").unwrap();
    let job_path = dir.path().join("job.yaml");
    fs::write(
        &job_path,
        format!(
            "database:\n  url: {}\ntarget:\n  table: orders\n  columns: [id, total]\nsource:\n  path: {}\n",
            db.display(),
            input.display()
        ),
    )
    .unwrap();

    let output = run_sqlload(&["load", "--config", job_path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("column 'total' not found"), "{}", stderr(&output));
}

#[tokio::test]
async fn test_describe_prints_columns() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_orders_db(dir.path()).await;
    let job = write_job(dir.path(), &db, &dir.path().join("unused.csv"), "");

    let output = run_sqlload(&["describe", "--config", job.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec!["id\t4\tINTEGER", "customer\t12\tVARCHAR(40)", "placed\t91\tDATE"]
    );
}

#[test]
fn test_missing_job_file_fails() {
    let output = run_sqlload(&["load", "--config", "/nonexistent/job.yaml"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read job file"));
}
