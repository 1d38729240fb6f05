//! YAML job configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use sqlload_adapter_db::{ConnectionConfig, FaultKind};
use sqlload_pipeline::{RetryPolicy, WriterOptions};

/// One load job: where rows come from and where they go.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub database: DatabaseSection,
    pub target: TargetSection,
    #[serde(default)]
    pub writer: WriterSection,
    #[serde(default)]
    pub source: SourceSection,
    /// JSON lines file receiving rejected rows; logged only when absent
    #[serde(default)]
    pub dirty_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub connect_retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

/// A destination column, optionally with its declared type.
///
/// When every column carries a type the table is not inspected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Name(String),
    Typed {
        name: String,
        #[serde(rename = "type")]
        type_label: String,
    },
}

impl ColumnSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Typed { name, .. } => name,
        }
    }

    pub fn type_label(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Typed { type_label, .. } => Some(type_label),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterSection {
    pub batch_size: usize,
    pub empty_as_null: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub exponential_backoff: bool,
    pub max_delay_ms: u64,
    /// Also retry rows rejected by the database
    pub retry_rejected: bool,
}

impl Default for WriterSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            batch_size: sqlload_pipeline::writer::DEFAULT_BATCH_SIZE,
            empty_as_null: false,
            max_retries: retry.max_retries,
            retry_delay_ms: millis(retry.delay),
            exponential_backoff: false,
            max_delay_ms: millis(sqlload_pipeline::retry::DEFAULT_MAX_DELAY),
            retry_rejected: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub path: Option<PathBuf>,
    pub delimiter: char,
    pub has_header: bool,
    /// Field text read as NULL
    pub null_marker: Option<String>,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            path: None,
            delimiter: ',',
            has_header: true,
            null_marker: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl JobConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid job file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target.columns.is_empty() {
            bail!("target.columns must list at least one column");
        }
        if !self.source.delimiter.is_ascii() {
            bail!("source.delimiter must be a single ASCII character");
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.target
            .columns
            .iter()
            .map(|column| column.name().to_string())
            .collect()
    }

    /// `(name, type)` pairs when every column declares its type.
    pub fn declared_types(&self) -> Option<Vec<(String, String)>> {
        self.target
            .columns
            .iter()
            .map(|column| {
                column
                    .type_label()
                    .map(|label| (column.name().to_string(), label.to_string()))
            })
            .collect()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            database_url: self.database.url.clone(),
            auth_token: self.database.auth_token.clone(),
            timeout_ms: self.database.timeout_ms,
            retry_attempts: self.database.connect_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let writer = &self.writer;
        let mut policy = RetryPolicy::default()
            .with_max_retries(writer.max_retries)
            .with_delay(Duration::from_millis(writer.retry_delay_ms));
        if writer.exponential_backoff {
            policy = policy.with_exponential_backoff(Duration::from_millis(writer.max_delay_ms));
        }
        if writer.retry_rejected {
            policy = policy.with_retry_on(vec![FaultKind::TransientConnection, FaultKind::Other]);
        }
        policy
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions::new(self.target.table.clone(), self.column_names())
            .with_batch_size(self.writer.batch_size)
            .with_empty_as_null(self.writer.empty_as_null)
            .with_retry(self.retry_policy())
    }
}
