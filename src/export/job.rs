//! Export job orchestration
//!
//! An [`ExportJob`] binds a query, a connection profile, an output format and
//! a destination path, and drives the pull loop: one row is fetched, coerced
//! and handed to the writer at a time, in cursor order.
//!
//! The writer always targets a hidden sibling of the destination
//! (`.<name>.<uuid>.partial`). Only a completed job renames it into place, so
//! a file at the destination path is always a complete export.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConnectionConfig, ExportConfig};
use crate::connection::Credentials;
use crate::error::{HawkError, Result};
use crate::profiles::ConnectionProfile;

use super::ExportFormat;
use super::streaming::TypedRowStream;
use super::writers::{
    FormatWriter, WriterOptions, open_writer, sql::PLACEHOLDER_TABLE, table_name_from_query,
};

/// Lifecycle of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, Failed and Cancelled are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What to export and where
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub query: String,
    pub profile: ConnectionProfile,
    pub format: ExportFormat,
    pub destination: PathBuf,
}

/// Result of an export job
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    /// Number of rows exported
    pub rows: u64,
    /// File size in bytes
    pub bytes: u64,
    /// Time taken for export
    pub elapsed_ms: u64,
    pub status: JobStatus,
    /// Where the output lives: the destination when completed, the partial
    /// file when a cancelled job keeps it, otherwise nothing
    pub path: Option<PathBuf>,
}

/// Receives the number of rows written so far
pub type ProgressCallback = Box<dyn FnMut(u64) + Send + Sync>;

enum PumpOutcome {
    Exhausted,
    Cancelled,
}

/// A single export run
pub struct ExportJob {
    request: ExportRequest,
    options: WriterOptions,
    keep_partial: bool,
    progress_interval: u64,
    status: JobStatus,
    cancel_token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl ExportJob {
    /// Create a new export job
    pub fn new(request: ExportRequest, options: WriterOptions) -> Self {
        Self {
            request,
            options,
            keep_partial: false,
            progress_interval: 1000,
            status: JobStatus::Pending,
            cancel_token: CancellationToken::new(),
            progress: None,
        }
    }

    /// Create a job with writer settings taken from the export configuration
    ///
    /// Without an explicit table the INSERT target is inferred from the query,
    /// falling back to a placeholder name.
    pub fn from_config(request: ExportRequest, config: &ExportConfig, table: Option<String>) -> Self {
        let table = table
            .or_else(|| table_name_from_query(&request.query))
            .unwrap_or_else(|| PLACEHOLDER_TABLE.to_string());
        let options = WriterOptions::from_config(config, table);

        Self::new(request, options)
            .keep_partial(config.keep_partial)
            .progress_interval(config.progress_interval)
    }

    /// Keep the partial file of a cancelled job instead of deleting it
    pub fn keep_partial(mut self, keep: bool) -> Self {
        self.keep_partial = keep;
        self
    }

    /// Report progress every `rows` rows
    pub fn progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows.max(1);
        self
    }

    /// Set the progress callback
    pub fn on_progress(mut self, callback: impl FnMut(u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request cancellation; honored before the next row is pulled
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Connect with the job's profile and run the export
    pub async fn run(
        &mut self,
        credentials: &Credentials,
        config: &ConnectionConfig,
    ) -> Result<ExportSummary> {
        self.ensure_pending()?;

        info!(
            "Starting {} export with profile '{}' to {}",
            self.request.format,
            self.request.profile.name,
            self.request.destination.display()
        );

        match TypedRowStream::open(
            &self.request.profile,
            credentials,
            &self.request.query,
            config,
        )
        .await
        {
            Ok(stream) => self.run_with_stream(stream).await,
            Err(e) => {
                self.transition(JobStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// Run the export over an already opened stream
    ///
    /// The stream is closed on every exit path.
    pub async fn run_with_stream(&mut self, mut stream: TypedRowStream) -> Result<ExportSummary> {
        if let Err(e) = self.ensure_pending() {
            close_stream(&mut stream).await;
            return Err(e);
        }

        let start_time = Instant::now();

        let (temp, mut writer) = match self.prepare_output().await {
            Ok(prepared) => prepared,
            Err(e) => {
                close_stream(&mut stream).await;
                self.transition(JobStatus::Failed)?;
                return Err(e);
            }
        };

        self.transition(JobStatus::Running)?;
        debug!("Writing to temporary file {}", temp.display());

        let outcome = self.pump(&mut stream, writer.as_mut()).await;
        close_stream(&mut stream).await;
        let rows = writer.rows_written();

        match outcome {
            Ok(PumpOutcome::Exhausted) => match self.complete(writer.as_mut(), &temp).await {
                Ok(bytes) => {
                    self.transition(JobStatus::Completed)?;
                    self.report_progress(rows);

                    let elapsed_ms = start_time.elapsed().as_millis() as u64;
                    info!(
                        "Export completed: {} rows, {} bytes, {} ms",
                        rows, bytes, elapsed_ms
                    );
                    Ok(ExportSummary {
                        rows,
                        bytes,
                        elapsed_ms,
                        status: JobStatus::Completed,
                        path: Some(self.request.destination.clone()),
                    })
                }
                Err(e) => self.fail(writer.as_mut(), &temp, e).await,
            },
            Ok(PumpOutcome::Cancelled) => {
                writer.abort().await;

                let (path, bytes) = if self.keep_partial {
                    let bytes = writer.file_size().await.unwrap_or(0);
                    info!("Partial export kept at {}", temp.display());
                    (Some(temp), bytes)
                } else {
                    remove_partial(&temp).await;
                    (None, 0)
                };

                self.transition(JobStatus::Cancelled)?;
                info!("Export cancelled after {} rows", rows);

                Ok(ExportSummary {
                    rows,
                    bytes,
                    elapsed_ms: start_time.elapsed().as_millis() as u64,
                    status: JobStatus::Cancelled,
                    path,
                })
            }
            Err(e) => self.fail(writer.as_mut(), &temp, e).await,
        }
    }

    async fn prepare_output(&self) -> Result<(PathBuf, Box<dyn FormatWriter>)> {
        let temp = partial_path(&self.request.destination)?;
        match open_writer(self.request.format, &temp, &self.options).await {
            Ok(writer) => Ok((temp, writer)),
            Err(e) => {
                remove_partial(&temp).await;
                Err(e)
            }
        }
    }

    /// Header, then rows until the stream ends or the job is cancelled
    async fn pump(
        &mut self,
        stream: &mut TypedRowStream,
        writer: &mut dyn FormatWriter,
    ) -> Result<PumpOutcome> {
        writer.begin(stream.schema()).await?;

        loop {
            let row_index = writer.rows_written() + 1;

            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    debug!("Cancellation requested before row {}", row_index);
                    return Ok(PumpOutcome::Cancelled);
                }
                next = stream.next() => next,
            };

            let Some(row) = next.map_err(|e| e.at_row(row_index))? else {
                return Ok(PumpOutcome::Exhausted);
            };
            writer
                .write_row(&row)
                .await
                .map_err(|e| e.at_row(row_index))?;

            if row_index % self.progress_interval == 0 {
                self.report_progress(row_index);
            }
        }
    }

    /// Finalize the writer and move the file into place
    async fn complete(&self, writer: &mut dyn FormatWriter, temp: &Path) -> Result<u64> {
        writer.finalize().await?;
        let bytes = writer.file_size().await?;
        tokio::fs::rename(temp, &self.request.destination).await?;
        Ok(bytes)
    }

    async fn fail(
        &mut self,
        writer: &mut dyn FormatWriter,
        temp: &Path,
        error: HawkError,
    ) -> Result<ExportSummary> {
        writer.abort().await;
        remove_partial(temp).await;
        self.transition(JobStatus::Failed)?;

        match error.row() {
            Some(row) => warn!("Export failed at row {}: {}", row, error),
            None => warn!("Export failed: {}", error),
        }
        Err(error)
    }

    fn report_progress(&mut self, rows: u64) {
        if let Some(callback) = self.progress.as_mut() {
            callback(rows);
        }
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(HawkError::InvalidState(format!(
                "export job has already run (status: {})",
                self.status
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(HawkError::InvalidState(format!(
                "cannot move export job from {} to {}",
                self.status, next
            )));
        }
        debug!("Export job {} -> {}", self.status, next);
        self.status = next;
        Ok(())
    }
}

/// Hidden sibling of the destination used while the export runs
fn partial_path(destination: &Path) -> Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", destination.display()),
        )
    })?;
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    Ok(dir.join(format!(
        ".{}.{}.partial",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", path.display(), e),
    }
}

async fn close_stream(stream: &mut TypedRowStream) {
    if let Err(e) = stream.close().await {
        warn!("Failed to close row stream: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::export::streaming::tests::MockCursor;
    use std::io::Read;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    fn users_cursor() -> MockCursor {
        MockCursor::new(
            &[("id", "BIGINT"), ("name", "VARCHAR"), ("created", "DATETIME")],
            vec![
                vec![Some("1"), Some("O'Neil"), Some("2024-01-05 10:00:00")],
                vec![Some("2"), None, Some("2024-01-06 11:30:00")],
            ],
        )
    }

    fn numbers_cursor(n: usize) -> MockCursor {
        let values: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
        MockCursor::new(
            &[("n", "INT")],
            values.iter().map(|v| vec![Some(v.as_str())]).collect(),
        )
    }

    fn request(dir: &Path, file: &str, format: ExportFormat) -> ExportRequest {
        ExportRequest {
            query: "SELECT id, name, created FROM users".to_string(),
            profile: ConnectionProfile::new("local", "localhost", 3306, "root", "shop"),
            format,
            destination: dir.join(file),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn stream(cursor: MockCursor) -> TypedRowStream {
        TypedRowStream::new(Box::new(cursor)).await.unwrap()
    }

    #[tokio::test]
    async fn test_sql_export_of_users() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = ExportJob::from_config(
            request(dir.path(), "users.sql", ExportFormat::Sql),
            &ExportConfig::default(),
            None,
        );
        assert_eq!(job.options().table, "users");

        let summary = job.run_with_stream(stream(users_cursor()).await).await.unwrap();
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.rows, 2);
        assert_eq!(job.status(), JobStatus::Completed);

        let content = std::fs::read_to_string(dir.path().join("users.sql")).unwrap();
        assert_eq!(
            content,
            "INSERT INTO \"users\" (\"id\",\"name\",\"created\") VALUES \
             (1,'O''Neil','2024-01-05T10:00:00'),(2,NULL,'2024-01-06T11:30:00');\n"
        );
        assert_eq!(summary.bytes, content.len() as u64);
        assert_eq!(entries(dir.path()), vec!["users.sql"]);
    }

    #[tokio::test]
    async fn test_empty_result_every_format() {
        let dir = tempfile::tempdir().unwrap();
        for format in [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Sql] {
            let file = format!("empty.{}", format.extension());
            let mut job = ExportJob::new(
                request(dir.path(), &file, format),
                WriterOptions::default(),
            );
            let cursor = MockCursor::new(&[("id", "BIGINT"), ("name", "VARCHAR")], vec![]);
            let summary = job.run_with_stream(stream(cursor).await).await.unwrap();
            assert_eq!(summary.rows, 0);
            assert_eq!(summary.status, JobStatus::Completed);

            let path = dir.path().join(&file);
            match format {
                ExportFormat::Csv => {
                    let mut reader = ::csv::Reader::from_path(&path).unwrap();
                    assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), vec!["id", "name"]);
                    assert_eq!(reader.records().count(), 0);
                }
                ExportFormat::Xlsx => {
                    let mut archive =
                        zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
                    let mut xml = String::new();
                    archive
                        .by_name("xl/worksheets/sheet1.xml")
                        .unwrap()
                        .read_to_string(&mut xml)
                        .unwrap();
                    assert_eq!(xml.matches("<row ").count(), 1);
                }
                ExportFormat::Sql => {
                    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
                }
            }
        }
        assert_eq!(entries(dir.path()).len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();

        let mut job = ExportJob::new(
            request(dir.path(), "numbers.csv", ExportFormat::Csv),
            WriterOptions::default(),
        )
        .progress_interval(1)
        .with_cancellation(token)
        .on_progress(move |rows| {
            if rows == 3 {
                trigger.cancel();
            }
        });

        let cursor = numbers_cursor(10);
        let closes = Arc::clone(&cursor.closes);
        let summary = job.run_with_stream(stream(cursor).await).await.unwrap();

        assert_eq!(summary.status, JobStatus::Cancelled);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.path, None);
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = ExportJob::new(
            request(dir.path(), "numbers.csv", ExportFormat::Csv),
            WriterOptions::default(),
        )
        .keep_partial(true);
        job.cancel();

        let summary = job.run_with_stream(stream(numbers_cursor(5)).await).await.unwrap();
        assert_eq!(summary.status, JobStatus::Cancelled);
        assert_eq!(summary.rows, 0);

        let kept = summary.path.unwrap();
        assert!(kept.exists());
        assert!(!dir.path().join("numbers.csv").exists());
        let name = kept.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".numbers.csv."));
        assert!(name.ends_with(".partial"));
    }

    #[tokio::test]
    async fn test_failure_reports_row_and_discards_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = ExportJob::new(
            request(dir.path(), "blobs.csv", ExportFormat::Csv),
            WriterOptions::default(),
        );
        let cursor = MockCursor::new(
            &[("id", "INT"), ("payload", "BLOB")],
            vec![
                vec![Some("1"), None],
                vec![Some("2"), Some("\u{1}\u{2}")],
                vec![Some("3"), None],
            ],
        );

        let err = job.run_with_stream(stream(cursor).await).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedValueError);
        assert_eq!(err.row(), Some(2));
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cursor_failure_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = ExportJob::new(
            request(dir.path(), "numbers.sql", ExportFormat::Sql),
            WriterOptions::default(),
        );
        let mut cursor = numbers_cursor(2);
        cursor.push_error(crate::error::ConnectionError::Disconnected("reset".into()).into());

        let err = job.run_with_stream(stream(cursor).await).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert_eq!(err.row(), Some(3));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut job = ExportJob::new(
            request(&missing, "out.csv", ExportFormat::Csv),
            WriterOptions::default(),
        );
        let cursor = numbers_cursor(1);
        let closes = Arc::clone(&cursor.closes);

        let err = job.run_with_stream(stream(cursor).await).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.row(), None);
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_job_runs_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = ExportJob::new(
            request(dir.path(), "once.csv", ExportFormat::Csv),
            WriterOptions::default(),
        );
        job.run_with_stream(stream(numbers_cursor(1)).await).await.unwrap();

        let err = job
            .run_with_stream(stream(numbers_cursor(1)).await)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_progress_reported_at_interval_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut job = ExportJob::new(
            request(dir.path(), "numbers.csv", ExportFormat::Csv),
            WriterOptions::default(),
        )
        .progress_interval(2)
        .on_progress(move |rows| sink.lock().unwrap().push(rows));

        job.run_with_stream(stream(numbers_cursor(5)).await).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![2, 4, 5]);

        let content = std::fs::read_to_string(dir.path().join("numbers.csv")).unwrap();
        assert_eq!(content, "n\n1\n2\n3\n4\n5\n");
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let path = partial_path(Path::new("/tmp/out/report.xlsx")).unwrap();
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/out"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".report.xlsx."));
        assert!(name.ends_with(".partial"));

        let bare = partial_path(Path::new("report.csv")).unwrap();
        assert_eq!(bare.parent().unwrap(), Path::new("."));
        assert!(partial_path(Path::new("/")).is_err());
    }
}
