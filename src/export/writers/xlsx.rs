//! Excel workbook writer
//!
//! Writes a single worksheet in the workbook library's constant-memory mode:
//! each row is flushed to a temporary file once the next row starts, so the
//! sheet is never held in memory as a whole. The archive itself is assembled
//! in `finalize`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::debug;

use crate::error::{ExportError, HawkError, Result};
use crate::value::{ColumnSchema, Temporal, Value};

use super::{FormatWriter, validate_path};

/// Rows per sheet, header included
pub const MAX_ROWS: u32 = 1_048_576;
/// Columns per sheet
pub const MAX_COLUMNS: usize = 16_384;
/// Characters per cell
pub const MAX_CELL_CHARS: usize = 32_767;

/// Largest integer magnitude a double holds exactly
const MAX_EXACT_INTEGER: u128 = 1 << 53;

const SECONDS_PER_DAY: f64 = 86_400.0;

struct CellFormats {
    header: Format,
    date: Format,
    time: Format,
    time_fraction: Format,
    datetime: Format,
    datetime_fraction: Format,
}

impl CellFormats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            date: Format::new().set_num_format("yyyy-mm-dd"),
            time: Format::new().set_num_format("[h]:mm:ss"),
            time_fraction: Format::new().set_num_format("[h]:mm:ss.000"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            datetime_fraction: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss.000"),
        }
    }

    fn for_temporal(&self, t: &Temporal) -> &Format {
        match (t, t.has_fraction()) {
            (Temporal::Date(_), _) => &self.date,
            (Temporal::Time(_), false) => &self.time,
            (Temporal::Time(_), true) => &self.time_fraction,
            (Temporal::DateTime(_), false) => &self.datetime,
            (Temporal::DateTime(_), true) => &self.datetime_fraction,
        }
    }
}

/// Writer for `.xlsx` workbooks
pub struct XlsxWriter {
    workbook: Option<Workbook>,
    path: PathBuf,
    columns: Vec<String>,
    formats: CellFormats,
    max_rows: u32,
    written: u64,
}

impl XlsxWriter {
    /// Create a new workbook writer with one sheet named `sheet_name`
    ///
    /// The destination file is created immediately so an unwritable path
    /// fails here rather than at the end of the export.
    pub fn new(path: &Path, sheet_name: &str) -> Result<Self> {
        validate_path(path)?;
        std::fs::File::create(path)?;

        let mut workbook = Workbook::new();
        workbook
            .add_worksheet_with_constant_memory()
            .set_name(sheet_name)?;

        debug!(
            "Created workbook writer for: {} (sheet '{}')",
            path.display(),
            sheet_name
        );

        Ok(Self {
            workbook: Some(workbook),
            path: path.to_path_buf(),
            columns: Vec::new(),
            formats: CellFormats::new(),
            max_rows: MAX_ROWS,
            written: 0,
        })
    }

    fn capacity(limit: String) -> HawkError {
        ExportError::CapacityExceeded {
            format: "XLSX",
            limit,
        }
        .into()
    }

    fn sheet(workbook: &mut Option<Workbook>) -> Result<&mut Worksheet> {
        let workbook = workbook
            .as_mut()
            .ok_or_else(|| HawkError::InvalidState("workbook writer already closed".into()))?;
        Ok(workbook.worksheet_from_index(0)?)
    }
}

fn check_text_len(column: &str, text: &str) -> Result<()> {
    if text.chars().count() > MAX_CELL_CHARS {
        return Err(XlsxWriter::capacity(format!(
            "{MAX_CELL_CHARS} characters per cell (column '{column}')"
        )));
    }
    Ok(())
}

/// Whether Excel can show the value as a date/time serial
///
/// Serials start at 1900-01-01 and cannot be negative; anything outside that
/// range is written as its ISO text instead.
fn has_serial(t: &Temporal) -> bool {
    let first_day = NaiveDate::from_ymd_opt(1900, 1, 1);
    match t {
        Temporal::Date(d) => Some(*d) >= first_day,
        Temporal::DateTime(dt) => Some(dt.date()) >= first_day,
        Temporal::Time(_) => !t.is_negative(),
    }
}

/// Write one value into a cell; absent values leave the cell empty
fn write_cell(
    sheet: &mut Worksheet,
    formats: &CellFormats,
    row: u32,
    col: u16,
    column: &str,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Absent => {}
        Value::Integer(i) if i.unsigned_abs() <= MAX_EXACT_INTEGER => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Value::Integer(i) => {
            sheet.write_string(row, col, i.to_string())?;
        }
        Value::Real(f) if f.is_finite() => {
            sheet.write_number(row, col, *f)?;
        }
        Value::Real(_) => {
            return Err(ExportError::UnsupportedValue {
                column: column.to_string(),
                kind: "non-finite Real".to_string(),
                format: "XLSX",
            }
            .into());
        }
        Value::Decimal(d) => match d.to_f64_exact() {
            Some(n) => {
                sheet.write_number(row, col, n)?;
            }
            None => {
                sheet.write_string(row, col, d.as_str())?;
            }
        },
        Value::Text(s) => {
            check_text_len(column, s)?;
            sheet.write_string(row, col, s)?;
        }
        Value::Binary(bytes) => {
            let encoded = hex::encode(bytes);
            check_text_len(column, &encoded)?;
            sheet.write_string(row, col, encoded)?;
        }
        Value::Boolean(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::DateTime(t) if !has_serial(t) => {
            sheet.write_string(row, col, t.to_iso_string())?;
        }
        Value::DateTime(t) => {
            let format = formats.for_temporal(t);
            match t {
                Temporal::Date(d) => sheet.write_datetime_with_format(row, col, d, format)?,
                Temporal::Time(duration) => {
                    let secs = duration.num_seconds() as f64
                        + f64::from(duration.subsec_nanos()) / 1e9;
                    sheet.write_number_with_format(row, col, secs / SECONDS_PER_DAY, format)?
                }
                Temporal::DateTime(dt) => sheet.write_datetime_with_format(row, col, dt, format)?,
            };
        }
    }
    Ok(())
}

#[async_trait]
impl FormatWriter for XlsxWriter {
    async fn begin(&mut self, schema: &ColumnSchema) -> Result<()> {
        if schema.len() > MAX_COLUMNS {
            return Err(Self::capacity(format!(
                "{MAX_COLUMNS} columns per sheet, result has {}",
                schema.len()
            )));
        }
        self.columns = schema.names().map(str::to_string).collect();

        let sheet = Self::sheet(&mut self.workbook)?;
        for (col, name) in self.columns.iter().enumerate() {
            check_text_len(name, name)?;
            sheet.write_string_with_format(0, col as u16, name, &self.formats.header)?;
        }

        debug!("Wrote workbook header: {} columns", self.columns.len());
        Ok(())
    }

    async fn write_row(&mut self, row: &[Value]) -> Result<()> {
        let row_num = self.written + 1;
        if row_num >= u64::from(self.max_rows) {
            return Err(Self::capacity(format!(
                "{} rows per sheet including the header",
                self.max_rows
            )));
        }

        let sheet = Self::sheet(&mut self.workbook)?;
        for (col, value) in row.iter().enumerate() {
            let column = self.columns.get(col).map(String::as_str).unwrap_or_default();
            write_cell(sheet, &self.formats, row_num as u32, col as u16, column, value)?;
        }

        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        let mut workbook = self
            .workbook
            .take()
            .ok_or_else(|| HawkError::InvalidState("workbook writer already closed".into()))?;
        workbook.save(&self.path)?;

        debug!(
            "Finalized workbook: {} ({} rows)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    async fn abort(&mut self) {
        if self.workbook.take().is_some() {
            debug!("Discarded unsaved workbook for {}", self.path.display());
        }
    }

    fn rows_written(&self) -> u64 {
        self.written
    }

    async fn file_size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}
