//! Result-set export engine
//!
//! This module streams a query result into one of three file formats:
//! - CSV text
//! - Excel workbook (`.xlsx`)
//! - SQL `INSERT` script
//!
//! # Architecture
//!
//! 1. **TypedRowStream**: wraps a database cursor and yields coerced rows one at a time
//! 2. **FormatWriter**: serializes rows into one output format
//! 3. **ProgressTracker**: terminal feedback for long exports
//!
//! These are orchestrated by the **ExportJob**, which owns the job's state
//! machine, cancellation and the temp-file-then-rename handling of the output.
//!
//! # Example
//!
//! ```no_run
//! use hawkdb::config::Config;
//! use hawkdb::connection::Credentials;
//! use hawkdb::export::{ExportFormat, ExportJob, ExportRequest};
//! use hawkdb::profiles::ConnectionProfile;
//!
//! # async fn demo() -> hawkdb::error::Result<()> {
//! let config = Config::default();
//! let request = ExportRequest {
//!     query: "SELECT * FROM users".to_string(),
//!     profile: ConnectionProfile::new("local", "localhost", 3306, "root", "shop"),
//!     format: ExportFormat::Csv,
//!     destination: "users.csv".into(),
//! };
//! let mut job = ExportJob::from_config(request, &config.export, None);
//! let summary = job.run(&Credentials::new("secret"), &config.connection).await?;
//! println!("{} rows", summary.rows);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use chrono::Local;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod job;
pub mod progress;
pub mod streaming;
pub mod writers;

pub use job::{ExportJob, ExportRequest, ExportSummary, JobStatus, ProgressCallback};
pub use progress::ProgressTracker;
pub use streaming::TypedRowStream;
pub use writers::{BinaryPolicy, FormatWriter, SqlDialect, WriterOptions};

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Sql,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Sql => "sql",
        }
    }

    /// Infer the format from a file extension, case-insensitively
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Xlsx),
            "sql" => Some(ExportFormat::Sql),
            _ => None,
        }
    }

    /// Timestamped file name, e.g. `export-2024-01-05_10-00-00.csv`
    pub fn default_file_name(&self) -> String {
        format!(
            "export-{}.{}",
            Local::now().format("%Y-%m-%d_%H-%M-%S"),
            self.extension()
        )
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Xlsx => "XLSX",
            ExportFormat::Sql => "SQL",
        })
    }
}
