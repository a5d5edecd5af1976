//! CSV writer for export operations
//!
//! One header record of column names, then one record per row, LF-terminated
//! and UTF-8 encoded. Fields are quoted only when they need to be.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{ExportError, HawkError, Result};
use crate::value::{ColumnSchema, Value};

use super::{BinaryPolicy, FormatWriter, create_writer, validate_path};

/// Writer for CSV format
pub struct CsvWriter {
    /// Buffered file writer, `None` once closed
    writer: Option<BufWriter<File>>,
    /// Path to the output file
    path: PathBuf,
    delimiter: char,
    binary: BinaryPolicy,
    /// Column names, used to name the offending column in errors
    columns: Vec<String>,
    /// Reused buffer for one record
    line: String,
    /// Number of rows written
    written: u64,
}

impl CsvWriter {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `delimiter` - Field separator
    /// * `binary` - How binary values are handled
    pub async fn new(path: &Path, delimiter: char, binary: BinaryPolicy) -> Result<Self> {
        validate_path(path)?;
        let writer = create_writer(path).await?;

        debug!("Created CSV writer for: {}", path.display());

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            delimiter,
            binary,
            columns: Vec::new(),
            line: String::new(),
            written: 0,
        })
    }

    /// Escape a CSV value if necessary
    ///
    /// Wraps in quotes and doubles internal quotes when the value contains
    /// the delimiter, a quote, or a line break.
    fn escape_csv_value(value: &str, delimiter: char) -> String {
        if value.contains(delimiter)
            || value.contains('"')
            || value.contains('\n')
            || value.contains('\r')
        {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    /// Render one field; `None` for values the binary policy rejects
    fn render(&self, value: &Value) -> Option<String> {
        let text = match value {
            Value::Absent => String::new(),
            // empty text must stay distinguishable from absent
            Value::Text(s) if s.is_empty() => "\"\"".to_string(),
            Value::Text(s) => Self::escape_csv_value(s, self.delimiter),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => f.to_string(),
            Value::Decimal(d) => d.as_str().to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(t) => t.to_iso_string(),
            Value::Binary(bytes) => match self.binary {
                BinaryPolicy::Reject => return None,
                BinaryPolicy::Base64 => STANDARD.encode(bytes),
                BinaryPolicy::Hex => hex::encode(bytes),
                BinaryPolicy::Text => match std::str::from_utf8(bytes) {
                    Ok("") => "\"\"".to_string(),
                    Ok(s) => Self::escape_csv_value(s, self.delimiter),
                    Err(_) => return None,
                },
            },
        };
        Some(text)
    }

    async fn write_line(&mut self) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| HawkError::InvalidState("CSV writer already closed".into()))?;
        self.line.push('\n');
        writer.write_all(self.line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl FormatWriter for CsvWriter {
    async fn begin(&mut self, schema: &ColumnSchema) -> Result<()> {
        self.columns = schema.names().map(str::to_string).collect();

        let delimiter = self.delimiter.to_string();
        self.line = self
            .columns
            .iter()
            .map(|name| Self::escape_csv_value(name, self.delimiter))
            .collect::<Vec<_>>()
            .join(&delimiter);
        self.write_line().await?;

        debug!("Wrote CSV headers: {} fields", self.columns.len());
        Ok(())
    }

    async fn write_row(&mut self, row: &[Value]) -> Result<()> {
        self.line.clear();
        for (i, value) in row.iter().enumerate() {
            let field = self.render(value).ok_or_else(|| ExportError::UnsupportedValue {
                column: self.columns.get(i).cloned().unwrap_or_default(),
                kind: value.kind_name(),
                format: "CSV",
            })?;
            if i > 0 {
                self.line.push(self.delimiter);
            }
            self.line.push_str(&field);
        }
        self.write_line().await?;

        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_ref().sync_all().await?;
        }

        debug!(
            "Finalized CSV file: {} ({} rows)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    async fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                debug!("Flush of aborted CSV file failed: {}", e);
            }
        }
    }

    fn rows_written(&self) -> u64 {
        self.written
    }

    async fn file_size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}
