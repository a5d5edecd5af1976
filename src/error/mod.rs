//! Error handling module for hawkdb.
//!
//! This module provides:
//! - A single crate-wide error type covering connection, query, coercion,
//!   export, profile store and configuration failures
//! - A flat [`ErrorKind`] classification for callers
//! - Structured information extracted from MySQL driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use hawkdb::error::{ErrorKind, HawkError, Result};
//!
//! fn report(err: &HawkError) {
//!     if err.kind() == ErrorKind::NotFoundError {
//!         eprintln!("no such profile");
//!     } else if let Some(row) = err.row() {
//!         eprintln!("export failed at row {row}: {err}");
//!     }
//! }
//! ```

pub mod kinds;
pub mod mysql;

// Re-export commonly used types
pub use kinds::{
    CoercionError, ConfigError, ConnectionError, ErrorKind, ExportError, HawkError, ProfileError,
    QueryError, Result,
};
pub use mysql::ErrorInfo;
