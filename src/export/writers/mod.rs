//! Format writers for export operations
//!
//! This module provides a unified interface for writing typed rows to the
//! supported file formats (CSV, Excel workbook, SQL INSERT script).

use std::io;
use std::path::Path;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::config::ExportConfig;
use crate::error::Result;
use crate::value::{ColumnSchema, Value};

use super::ExportFormat;

pub mod csv;
pub mod sql;
pub mod xlsx;

pub use csv::CsvWriter;
pub use sql::{SqlWriter, table_name_from_query};
pub use xlsx::XlsxWriter;

/// Trait for writing rows to different file formats
///
/// Calls arrive in order: `begin` once, `write_row` per row, then exactly one
/// of `finalize` or `abort`.
#[async_trait]
pub trait FormatWriter: Send {
    /// Write the header/structure for the given schema
    async fn begin(&mut self, schema: &ColumnSchema) -> Result<()>;

    /// Write one row, positionally matching the schema
    async fn write_row(&mut self, row: &[Value]) -> Result<()>;

    /// Flush and close the output
    async fn finalize(&mut self) -> Result<()>;

    /// Best-effort flush and close on failure or cancellation
    async fn abort(&mut self);

    /// Number of rows written so far
    fn rows_written(&self) -> u64;

    /// Get the current file size in bytes
    ///
    /// # Returns
    /// * `Result<u64>` - File size in bytes
    async fn file_size(&self) -> Result<u64>;
}

/// How CSV output handles binary values
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BinaryPolicy {
    /// Fail the export
    #[default]
    Reject,
    /// Standard base64 with padding
    Base64,
    /// Lowercase hexadecimal
    Hex,
    /// Written as text when the bytes are valid UTF-8, rejected otherwise
    ///
    /// The driver reports text columns with a `_bin` collation as binary;
    /// this policy exports them as the text they hold.
    Text,
}

/// Quoting and escaping conventions for INSERT scripts
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Double-quoted identifiers, backslashes taken literally
    #[default]
    Ansi,
    /// Backtick-quoted identifiers, backslash and NUL escaped
    #[value(name = "mysql")]
    MySql,
}

/// Per-format settings handed to a writer
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub delimiter: char,
    pub binary: BinaryPolicy,
    pub dialect: SqlDialect,
    pub batch_size: usize,
    pub sheet_name: String,
    pub table: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default(), sql::PLACEHOLDER_TABLE)
    }
}

impl WriterOptions {
    pub fn from_config(config: &ExportConfig, table: impl Into<String>) -> Self {
        Self {
            delimiter: config.delimiter,
            binary: config.binary,
            dialect: config.dialect,
            batch_size: config.batch_size.max(1),
            sheet_name: config.sheet_name.clone(),
            table: table.into(),
        }
    }
}

/// Create the writer for a format, targeting `path`
pub async fn open_writer(
    format: ExportFormat,
    path: &Path,
    options: &WriterOptions,
) -> Result<Box<dyn FormatWriter>> {
    Ok(match format {
        ExportFormat::Csv => Box::new(CsvWriter::new(path, options.delimiter, options.binary).await?),
        ExportFormat::Xlsx => Box::new(XlsxWriter::new(path, &options.sheet_name)?),
        ExportFormat::Sql => Box::new(
            SqlWriter::new(path, &options.table, options.dialect, options.batch_size).await?,
        ),
    })
}

/// Helper function to create a buffered file writer
///
/// # Arguments
/// * `path` - File path to create
///
/// # Returns
/// * `Result<BufWriter<File>>` - Buffered writer or error
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

/// Helper function to validate file path and directory
///
/// # Arguments
/// * `path` - File path to validate
///
/// # Returns
/// * `Result<()>` - Success or error
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory does not exist: {}", parent.display()),
            )
            .into());
        }
    }
    if path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is a directory", path.display()),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_path_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = validate_path(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);

        assert!(validate_path(&dir.path().join("out.csv")).is_ok());
        assert!(validate_path(dir.path()).is_err());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = ExportConfig::default();
        config.batch_size = 0;
        config.dialect = SqlDialect::MySql;
        let options = WriterOptions::from_config(&config, "orders");
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.dialect, SqlDialect::MySql);
        assert_eq!(options.table, "orders");
    }

    #[test]
    fn test_dialect_value_names() {
        assert_eq!(
            SqlDialect::from_str("mysql", true).unwrap(),
            SqlDialect::MySql
        );
        assert_eq!(
            BinaryPolicy::from_str("base64", true).unwrap(),
            BinaryPolicy::Base64
        );
    }
}
