use std::{fmt, io};

use crate::error::mysql::ErrorInfo;

/// Crate-wide `Result` type using [`HawkError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, HawkError>;

/// Top-level error type for hawkdb operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum HawkError {
    /// Cannot reach or authenticate to the database.
    Connection(ConnectionError),

    /// The server rejected the query.
    Query(QueryError),

    /// A driver value could not be narrowed to a logical value.
    Coercion(CoercionError),

    /// Output-format errors (unsupported values, capacity limits).
    Export(ExportError),

    /// Connection profile store errors.
    Profile(ProfileError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors on the destination or store files.
    Io(io::Error),

    /// An error raised while processing a specific result row (1-based).
    AtRow { row: u64, source: Box<HawkError> },

    /// Operation attempted in the wrong job state.
    InvalidState(String),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Flat classification of [`HawkError`], used by callers that only need
/// to branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionError,
    QueryError,
    TypeCoercionError,
    UnsupportedValueError,
    CapacityExceededError,
    IoError,
    DuplicateNameError,
    NotFoundError,
    ConfigError,
    InvalidState,
    Other,
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(ErrorInfo),

    /// Connecting took longer than the configured timeout.
    Timeout { secs: u64 },

    /// No row arrived within the configured read timeout.
    ReadTimeout { secs: u64 },

    /// Connection lost while streaming.
    Disconnected(String),
}

/// Server-side query rejection, surfaced verbatim.
#[derive(Debug)]
pub struct QueryError {
    pub info: ErrorInfo,
}

/// Value coercion errors.
#[derive(Debug)]
pub enum CoercionError {
    /// The driver reported a native type with no logical mapping.
    UnsupportedType { column: String, driver_type: String },

    /// The raw bytes do not parse as the declared native type.
    InvalidValue {
        column: String,
        driver_type: String,
        reason: String,
    },
}

/// Format-specific export errors.
#[derive(Debug)]
pub enum ExportError {
    /// A value cannot be represented in the chosen output format.
    UnsupportedValue {
        column: String,
        kind: String,
        format: &'static str,
    },

    /// A format-specific limit was exceeded.
    CapacityExceeded {
        format: &'static str,
        limit: String,
    },

    /// The workbook library reported an error.
    Workbook(String),
}

/// Connection profile store errors.
#[derive(Debug)]
pub enum ProfileError {
    /// A profile with this name already exists and overwrite was not requested.
    DuplicateName(String),

    /// No profile with this name exists.
    NotFound(String),

    /// Profile fields failed validation.
    Invalid(String),

    /// The store file could not be parsed.
    InvalidFormat { path: String, reason: String },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Unreadable { path: String, reason: String },

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl HawkError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HawkError::Connection(_) => ErrorKind::ConnectionError,
            HawkError::Query(_) => ErrorKind::QueryError,
            HawkError::Coercion(_) => ErrorKind::TypeCoercionError,
            HawkError::Export(ExportError::UnsupportedValue { .. }) => {
                ErrorKind::UnsupportedValueError
            }
            HawkError::Export(ExportError::CapacityExceeded { .. }) => {
                ErrorKind::CapacityExceededError
            }
            HawkError::Export(ExportError::Workbook(_)) => ErrorKind::IoError,
            HawkError::Profile(ProfileError::DuplicateName(_)) => ErrorKind::DuplicateNameError,
            HawkError::Profile(ProfileError::NotFound(_)) => ErrorKind::NotFoundError,
            HawkError::Profile(_) => ErrorKind::ConfigError,
            HawkError::Config(_) => ErrorKind::ConfigError,
            HawkError::Io(_) => ErrorKind::IoError,
            HawkError::AtRow { source, .. } => source.kind(),
            HawkError::InvalidState(_) => ErrorKind::InvalidState,
            HawkError::Generic(_) => ErrorKind::Other,
        }
    }

    /// Row index (1-based) at which the error occurred, when known.
    pub fn row(&self) -> Option<u64> {
        match self {
            HawkError::AtRow { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Attach a row index unless one is already present.
    pub fn at_row(self, row: u64) -> Self {
        match self {
            HawkError::AtRow { .. } => self,
            other => HawkError::AtRow {
                row,
                source: Box::new(other),
            },
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for HawkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HawkError::Connection(e) => write!(f, "Connection error: {e}"),
            HawkError::Query(e) => write!(f, "Query error: {e}"),
            HawkError::Coercion(e) => write!(f, "Type coercion error: {e}"),
            HawkError::Export(e) => write!(f, "Export error: {e}"),
            HawkError::Profile(e) => write!(f, "Profile error: {e}"),
            HawkError::Config(e) => write!(f, "Configuration error: {e}"),
            HawkError::Io(e) => write!(f, "I/O error: {e}"),
            HawkError::AtRow { row, source } => write!(f, "{source} (at row {row})"),
            HawkError::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            HawkError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(info) => match info.hint() {
                Some(hint) => write!(f, "Failed to connect: {info} ({hint})"),
                None => write!(f, "Failed to connect: {info}"),
            },
            ConnectionError::Timeout { secs } => {
                write!(f, "Connection timed out after {secs}s")
            }
            ConnectionError::ReadTimeout { secs } => {
                write!(f, "No row received within {secs}s")
            }
            ConnectionError::Disconnected(msg) => write!(f, "Connection lost: {msg}"),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionError::UnsupportedType {
                column,
                driver_type,
            } => write!(f, "column '{column}' has unsupported type {driver_type}"),
            CoercionError::InvalidValue {
                column,
                driver_type,
                reason,
            } => write!(f, "column '{column}' ({driver_type}): {reason}"),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::UnsupportedValue {
                column,
                kind,
                format,
            } => write!(
                f,
                "{kind} value in column '{column}' cannot be represented in {format}"
            ),
            ExportError::CapacityExceeded { format, limit } => {
                write!(f, "{format} capacity exceeded: {limit}")
            }
            ExportError::Workbook(msg) => write!(f, "workbook writer failed: {msg}"),
        }
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::DuplicateName(name) => write!(f, "profile '{name}' already exists"),
            ProfileError::NotFound(name) => write!(f, "profile '{name}' not found"),
            ProfileError::Invalid(msg) => write!(f, "invalid profile: {msg}"),
            ProfileError::InvalidFormat { path, reason } => {
                write!(f, "profile store {path} is malformed: {reason}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unreadable { path, reason } => {
                write!(f, "cannot read config file {path}: {reason}")
            }
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for HawkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HawkError::Io(e) => Some(e),
            HawkError::AtRow { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for QueryError {}
impl std::error::Error for CoercionError {}
impl std::error::Error for ExportError {}
impl std::error::Error for ProfileError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to HawkError ========================= */

impl From<io::Error> for HawkError {
    fn from(err: io::Error) -> Self {
        HawkError::Io(err)
    }
}

impl From<ConnectionError> for HawkError {
    fn from(err: ConnectionError) -> Self {
        HawkError::Connection(err)
    }
}

impl From<QueryError> for HawkError {
    fn from(err: QueryError) -> Self {
        HawkError::Query(err)
    }
}

impl From<CoercionError> for HawkError {
    fn from(err: CoercionError) -> Self {
        HawkError::Coercion(err)
    }
}

impl From<ExportError> for HawkError {
    fn from(err: ExportError) -> Self {
        HawkError::Export(err)
    }
}

impl From<ProfileError> for HawkError {
    fn from(err: ProfileError) -> Self {
        HawkError::Profile(err)
    }
}

impl From<ConfigError> for HawkError {
    fn from(err: ConfigError) -> Self {
        HawkError::Config(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for HawkError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        HawkError::Export(ExportError::Workbook(err.to_string()))
    }
}

impl From<String> for HawkError {
    fn from(msg: String) -> Self {
        HawkError::Generic(msg)
    }
}

impl From<&str> for HawkError {
    fn from(msg: &str) -> Self {
        HawkError::Generic(msg.to_owned())
    }
}
