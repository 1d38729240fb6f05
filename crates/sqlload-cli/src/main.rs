//! # sqlload-cli
//!
//! Command-line bulk loader: reads a CSV file and writes its rows into a SQL
//! table in batches, sending rows that cannot be written to a dirty output.

mod config;
mod csv_source;
mod dirty_output;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sqlload_adapter_db::{
    ColumnDescriptor, Connection, ConnectionProvider, LibsqlConnector, LibsqlSchemaResolver,
    SchemaResolver, StaticSchema,
};
use sqlload_pipeline::{BatchWriter, DirtySink, LoggingSink, RowSource, WriteStats};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::JobConfig;
use crate::csv_source::CsvRowSource;
use crate::dirty_output::JsonLinesSink;

#[derive(Parser)]
#[command(name = "sqlload")]
#[command(about = "Bulk load CSV rows into a SQL table")]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file into the target table
    Load {
        /// Job configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Input CSV file, overrides source.path
        input: Option<PathBuf>,

        /// Rows per multi-row INSERT, overrides writer.batch_size
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Print the resolved destination columns
    Describe {
        /// Job configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Load {
            config,
            input,
            batch_size,
        } => {
            let mut job = JobConfig::from_path(&config)?;
            if let Some(input) = input {
                job.source.path = Some(input);
            }
            if let Some(batch_size) = batch_size {
                job.writer.batch_size = batch_size;
            }
            let stats = load(&job).await?;
            print_summary(&job, &stats);
        }
        Commands::Describe { config } => {
            let job = JobConfig::from_path(&config)?;
            let connector = LibsqlConnector::new(job.connection_config());
            for column in resolve_columns(&job, &connector).await? {
                println!("{}\t{}\t{}", column.name, column.code(), column.type_label);
            }
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn resolve_columns(
    job: &JobConfig,
    connector: &LibsqlConnector,
) -> anyhow::Result<Vec<ColumnDescriptor>> {
    let names = job.column_names();
    if let Some(declared) = job.declared_types() {
        let schema = StaticSchema::new().with_table(job.target.table.clone(), declared);
        return Ok(schema.describe(&job.target.table, &names).await?);
    }

    let connection = connector
        .acquire()
        .await
        .context("failed to connect for schema lookup")?;
    let columns = LibsqlSchemaResolver::new(&connection)
        .describe(&job.target.table, &names)
        .await;
    connection.close().await;
    Ok(columns?)
}

async fn load(job: &JobConfig) -> anyhow::Result<WriteStats> {
    let Some(path) = job.source.path.as_ref() else {
        bail!("no input file: set source.path or pass INPUT");
    };
    let file =
        File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;
    let mut source = CsvRowSource::from_reader(BufReader::new(file), &job.source);

    match &job.dirty_output {
        Some(dirty_path) => {
            let file = File::create(dirty_path).with_context(|| {
                format!("failed to create dirty output {}", dirty_path.display())
            })?;
            let (stats, sink) = run_writer(job, &mut source, JsonLinesSink::new(file)).await?;
            info!(
                path = %dirty_path.display(),
                written = sink.written(),
                failed = sink.failed(),
                "dirty rows recorded"
            );
            Ok(stats)
        }
        None => {
            let (stats, _) = run_writer(job, &mut source, LoggingSink::new()).await?;
            Ok(stats)
        }
    }
}

async fn run_writer<S: DirtySink>(
    job: &JobConfig,
    source: &mut dyn RowSource,
    sink: S,
) -> anyhow::Result<(WriteStats, S)> {
    let connector = LibsqlConnector::new(job.connection_config());
    let columns = resolve_columns(job, &connector).await?;
    let expected_columns = columns.len();

    let mut writer = BatchWriter::new(job.writer_options(), columns, &connector, sink)?;
    let connection = connector
        .acquire()
        .await
        .context("failed to connect to the destination")?;
    writer
        .write(source, connection, expected_columns)
        .await
        .with_context(|| format!("load into '{}' aborted", job.target.table))?;
    Ok((writer.stats(), writer.into_sink()))
}

fn print_summary(job: &JobConfig, stats: &WriteStats) {
    println!("table: {}", job.target.table);
    println!("rows read: {}", stats.rows_read);
    println!("rows written: {}", stats.rows_written);
    println!("rows dirty: {}", stats.rows_dirty);
    println!("batches committed: {}", stats.batches_committed);
    println!("batches degraded: {}", stats.batches_degraded);
    println!("reconnects: {}", stats.reconnects);
}
