//! Database connection management
//!
//! This module provides:
//! - The cursor interface the export engine consumes ([`Cursor`])
//! - Connect-time credentials, kept out of persisted profiles
//! - The MySQL implementation of sessions and cursors

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub mod mysql;

pub use mysql::{MySqlCursor, MySqlSession};

/// Column metadata as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column label from the result set
    pub name: String,
    /// Native type name, e.g. `VARCHAR` or `BIGINT UNSIGNED`
    pub driver_type: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, driver_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver_type: driver_type.into(),
        }
    }
}

/// One raw row: per column, SQL NULL or the text-protocol bytes
pub type RawRow = Vec<Option<Vec<u8>>>;

/// Forward-only cursor over a query result
///
/// Each call to `fetch_next` pulls at most one row from the server.
#[async_trait]
pub trait Cursor: Send {
    /// Column metadata, available before the first row
    fn columns(&self) -> &[ColumnMeta];

    /// Fetch the next row
    ///
    /// # Returns
    /// * `Result<Option<RawRow>>` - Next row, or None if exhausted
    async fn fetch_next(&mut self) -> Result<Option<RawRow>>;

    /// Release the cursor and its connection; safe to call more than once
    async fn close(&mut self) -> Result<()>;
}

/// Secret supplied at connect time, never persisted
#[derive(Clone, Default)]
pub struct Credentials {
    password: String,
}

impl Credentials {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"***")
            .finish()
    }
}
