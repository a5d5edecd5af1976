//! SQL INSERT script writer
//!
//! Rows are grouped into multi-row statements:
//!
//! ```sql
//! INSERT INTO "users" ("id","name") VALUES (1,'Ann'),(2,NULL);
//! ```
//!
//! A statement is written out as soon as it holds `batch_size` rows, so at
//! most one batch is buffered. An empty result produces an empty script.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{ExportError, HawkError, Result};
use crate::value::{ColumnSchema, Value};

use super::{FormatWriter, SqlDialect, create_writer, validate_path};

/// Table name used when none is given and none can be inferred
pub const PLACEHOLDER_TABLE: &str = "table_name";

impl SqlDialect {
    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            SqlDialect::Ansi => format!("\"{}\"", name.replace('"', "\"\"")),
            SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Quote a string literal
    pub fn quote_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match (self, c) {
                (_, '\'') => out.push_str("''"),
                (SqlDialect::MySql, '\\') => out.push_str("\\\\"),
                (SqlDialect::MySql, '\0') => out.push_str("\\0"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }
}

/// Infer a target table from the first top-level `FROM <ident>` of a query
///
/// `FROM` inside parentheses (subqueries, `EXTRACT(YEAR FROM d)`) and inside
/// string literals is ignored. Quotes are stripped, only the last dotted
/// segment is kept and the result is reduced to `[A-Za-z0-9_$]`. Subqueries
/// and unnamed sources yield `None`.
pub fn table_name_from_query(query: &str) -> Option<String> {
    let top_level = top_level_text(query);
    let mut tokens = top_level.split(|c: char| c.is_whitespace() || c == ',' || c == ';');
    tokens.find(|t| t.eq_ignore_ascii_case("from"))?;

    let source = tokens.find(|t| !t.is_empty())?;
    if source.starts_with('(') {
        return None;
    }
    let last = source.rsplit('.').next().unwrap_or(source);

    let name: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// The query with string literals blanked out and parenthesized groups
/// collapsed to a lone `(`
fn top_level_text(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in query.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            if depth == 0 && q != '\'' {
                out.push(c);
            }
            continue;
        }
        match c {
            '\'' => {
                quote = Some(c);
                if depth == 0 {
                    out.push(' ');
                }
            }
            '`' | '"' => {
                quote = Some(c);
                if depth == 0 {
                    out.push(c);
                }
            }
            '(' => {
                if depth == 0 {
                    out.push_str(" (");
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(' ');
                }
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Writer for SQL INSERT scripts
pub struct SqlWriter {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    table: String,
    dialect: SqlDialect,
    batch_size: usize,
    /// `INSERT INTO ... VALUES ` prefix, built once per schema
    prefix: String,
    columns: Vec<String>,
    /// Statement under construction
    pending: String,
    pending_rows: usize,
    written: u64,
}

impl SqlWriter {
    /// Create a new SQL writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `table` - Target table name (unquoted)
    /// * `dialect` - Quoting conventions
    /// * `batch_size` - Rows per INSERT statement, at least 1
    pub async fn new(
        path: &Path,
        table: &str,
        dialect: SqlDialect,
        batch_size: usize,
    ) -> Result<Self> {
        validate_path(path)?;
        let writer = create_writer(path).await?;

        debug!(
            "Created SQL writer for: {} (table {}, batch {})",
            path.display(),
            table,
            batch_size
        );

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            table: table.to_string(),
            dialect,
            batch_size: batch_size.max(1),
            prefix: String::new(),
            columns: Vec::new(),
            pending: String::new(),
            pending_rows: 0,
            written: 0,
        })
    }

    /// Render one value as a literal
    fn literal(&self, column: usize, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Absent => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) if f.is_finite() => f.to_string(),
            Value::Real(_) => {
                return Err(ExportError::UnsupportedValue {
                    column: self.columns.get(column).cloned().unwrap_or_default(),
                    kind: "non-finite Real".to_string(),
                    format: "SQL",
                }
                .into());
            }
            Value::Decimal(d) => d.as_str().to_string(),
            Value::Text(s) => self.dialect.quote_string(s),
            Value::Binary(bytes) => format!("X'{}'", hex::encode(bytes)),
            Value::Boolean(true) => "TRUE".to_string(),
            Value::Boolean(false) => "FALSE".to_string(),
            Value::DateTime(t) => format!("'{}'", t.to_iso_string()),
        })
    }

    async fn flush_batch(&mut self) -> Result<()> {
        if self.pending_rows == 0 {
            return Ok(());
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| HawkError::InvalidState("SQL writer already closed".into()))?;

        self.pending.push_str(";\n");
        writer.write_all(self.pending.as_bytes()).await?;

        debug!("Wrote INSERT statement with {} rows", self.pending_rows);
        self.pending.clear();
        self.pending_rows = 0;
        Ok(())
    }
}

#[async_trait]
impl FormatWriter for SqlWriter {
    async fn begin(&mut self, schema: &ColumnSchema) -> Result<()> {
        self.columns = schema.names().map(str::to_string).collect();

        let columns = self
            .columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");
        self.prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            self.dialect.quote_identifier(&self.table),
            columns
        );
        Ok(())
    }

    async fn write_row(&mut self, row: &[Value]) -> Result<()> {
        // render fully before touching the batch so a bad value leaves it intact
        let literals = row
            .iter()
            .enumerate()
            .map(|(i, v)| self.literal(i, v))
            .collect::<Result<Vec<_>>>()?;

        if self.pending_rows == 0 {
            self.pending.push_str(&self.prefix);
        } else {
            self.pending.push(',');
        }
        self.pending.push('(');
        self.pending.push_str(&literals.join(","));
        self.pending.push(')');
        self.pending_rows += 1;
        self.written += 1;

        if self.pending_rows >= self.batch_size {
            self.flush_batch().await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.flush_batch().await?;
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_ref().sync_all().await?;
        }

        debug!(
            "Finalized SQL file: {} ({} rows)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    async fn abort(&mut self) {
        self.pending.clear();
        self.pending_rows = 0;
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                debug!("Flush of aborted SQL file failed: {}", e);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::{Column, Temporal, resolve_type};
    use chrono::NaiveDate;
    use tokio::fs;

    fn users_schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            Column::new("id", resolve_type("id", "BIGINT").unwrap()),
            Column::new("name", resolve_type("name", "VARCHAR").unwrap()),
            Column::new("created", resolve_type("created", "DATETIME").unwrap()),
        ])
    }

    fn at(day: u32, h: u32, m: u32) -> Value {
        Value::DateTime(Temporal::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_users_scenario_single_statement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.sql");
        let mut writer = SqlWriter::new(&path, "users", SqlDialect::Ansi, 500).await.unwrap();

        writer.begin(&users_schema()).await.unwrap();
        writer
            .write_row(&[Value::Integer(1), Value::Text("O'Neil".into()), at(5, 10, 0)])
            .await
            .unwrap();
        writer
            .write_row(&[Value::Integer(2), Value::Absent, at(6, 11, 30)])
            .await
            .unwrap();
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            content,
            "INSERT INTO \"users\" (\"id\",\"name\",\"created\") VALUES \
             (1,'O''Neil','2024-01-05T10:00:00'),(2,NULL,'2024-01-06T11:30:00');\n"
        );
    }

    #[tokio::test]
    async fn test_batches_split_at_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batched.sql");
        let mut writer = SqlWriter::new(&path, "users", SqlDialect::Ansi, 2).await.unwrap();

        writer.begin(&users_schema()).await.unwrap();
        for i in 0..5 {
            writer
                .write_row(&[Value::Integer(i), Value::Text("it's".into()), at(1, 0, 0)])
                .await
                .unwrap();
        }
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        let statements: Vec<&str> = content.lines().collect();
        assert_eq!(statements.len(), 3);
        for statement in &statements {
            assert!(statement.starts_with("INSERT INTO \"users\""));
            assert!(statement.ends_with(");"));
            assert!(!statement.contains("'it's'"));
        }
        // three literals per tuple
        assert!(statements[2].ends_with("VALUES (4,'it''s','2024-01-01T00:00:00');"));
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sql");
        let mut writer = SqlWriter::new(&path, "users", SqlDialect::Ansi, 500).await.unwrap();
        writer.begin(&users_schema()).await.unwrap();
        writer.finalize().await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "");
        assert_eq!(writer.rows_written(), 0);
    }

    #[tokio::test]
    async fn test_other_literals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lits.sql");
        let schema = ColumnSchema::new(vec![
            Column::new("select", resolve_type("select", "BLOB").unwrap()),
            Column::new("ok", resolve_type("ok", "BOOLEAN").unwrap()),
            Column::new("amount", resolve_type("amount", "DECIMAL").unwrap()),
            Column::new("path", resolve_type("path", "VARCHAR").unwrap()),
        ]);
        let mut writer = SqlWriter::new(&path, "t", SqlDialect::MySql, 10).await.unwrap();
        writer.begin(&schema).await.unwrap();
        writer
            .write_row(&[
                Value::Binary(vec![0x00, 0xff]),
                Value::Boolean(false),
                Value::Decimal(crate::value::Decimal::parse("-0.10").unwrap()),
                Value::Text("C:\\tmp\0".into()),
            ])
            .await
            .unwrap();
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            content,
            "INSERT INTO `t` (`select`,`ok`,`amount`,`path`) VALUES \
             (X'00ff',FALSE,-0.10,'C:\\\\tmp\\0');\n"
        );
    }

    #[tokio::test]
    async fn test_non_finite_real_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nan.sql");
        let schema = ColumnSchema::new(vec![Column::new(
            "ratio",
            resolve_type("ratio", "DOUBLE").unwrap(),
        )]);
        let mut writer = SqlWriter::new(&path, "t", SqlDialect::Ansi, 10).await.unwrap();
        writer.begin(&schema).await.unwrap();

        let err = writer.write_row(&[Value::Real(f64::NAN)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedValueError);
        assert_eq!(writer.rows_written(), 0);
        writer.abort().await;
    }

    #[test]
    fn test_quoting_per_dialect() {
        assert_eq!(SqlDialect::Ansi.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqlDialect::MySql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(SqlDialect::Ansi.quote_string("a\\b'c"), "'a\\b''c'");
        assert_eq!(SqlDialect::MySql.quote_string("a\\b'c"), "'a\\\\b''c'");
    }

    #[test]
    fn test_table_name_from_query() {
        let cases = [
            ("SELECT * FROM users", Some("users")),
            ("select id from `shop`.`orders` where id > 1", Some("orders")),
            ("SELECT o.id FROM \"Orders\" o", Some("Orders")),
            ("SELECT a\nFROM\tlog_2024;", Some("log_2024")),
            ("SELECT * FROM (SELECT 1) AS t", None),
            ("SELECT EXTRACT(YEAR FROM created) FROM orders", Some("orders")),
            ("SELECT TRIM(LEADING 'x' FROM name) FROM customers", Some("customers")),
            ("SELECT 'from here' AS label FROM events", Some("events")),
            ("SELECT COUNT(*) FROM logs", Some("logs")),
            ("SELECT 1", None),
        ];
        for (query, expected) in cases {
            assert_eq!(
                table_name_from_query(query).as_deref(),
                expected,
                "query: {query}"
            );
        }
    }
}
