//! Typed row streams for export operations
//!
//! A [`TypedRowStream`] wraps a database [`Cursor`] and yields rows of
//! logical [`Value`]s under a fixed [`ColumnSchema`]. The sequence is lazy,
//! forward-only and cannot be restarted: every `next()` pulls exactly one row
//! from the cursor.

use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::{Credentials, Cursor, MySqlSession};
use crate::error::{ErrorInfo, HawkError, QueryError, Result};
use crate::profiles::ConnectionProfile;
use crate::value::{Column, ColumnSchema, Row, coerce, resolve_type};

/// Lazy, single-pass stream of typed rows
pub struct TypedRowStream {
    cursor: Option<Box<dyn Cursor>>,
    schema: ColumnSchema,
    /// Rows produced so far
    fetched: u64,
}

impl TypedRowStream {
    /// Connect with a profile, run the query and wrap the resulting cursor
    pub async fn open(
        profile: &ConnectionProfile,
        credentials: &Credentials,
        query: &str,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let session = MySqlSession::connect(profile, credentials, config).await?;
        let cursor = session.open_cursor(query).await?;
        Self::new(Box::new(cursor)).await
    }

    /// Wrap an open cursor, resolving its column types
    ///
    /// An unmappable column type fails here, before any row is read, and the
    /// cursor is closed.
    pub async fn new(mut cursor: Box<dyn Cursor>) -> Result<Self> {
        let resolved: std::result::Result<Vec<Column>, _> = cursor
            .columns()
            .iter()
            .map(|meta| {
                resolve_type(&meta.name, &meta.driver_type)
                    .map(|driver_type| Column::new(meta.name.clone(), driver_type))
            })
            .collect();

        let columns = match resolved {
            Ok(columns) => columns,
            Err(e) => {
                cursor.close().await?;
                return Err(e.into());
            }
        };

        debug!(
            "Opened row stream with columns: {}",
            columns
                .iter()
                .map(|c| format!("{} {}", c.name(), c.driver_type()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            cursor: Some(cursor),
            schema: ColumnSchema::new(columns),
            fetched: 0,
        })
    }

    /// Column schema, fixed for the lifetime of the stream
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Number of rows produced so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Pull and coerce the next row
    ///
    /// # Returns
    /// * `Result<Option<Row>>` - Next row, or None once the stream is exhausted or closed
    pub async fn next(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let raw = match cursor.fetch_next().await? {
            Some(raw) => raw,
            None => {
                debug!("Row stream exhausted after {} rows", self.fetched);
                self.close().await?;
                return Ok(None);
            }
        };

        if raw.len() != self.schema.len() {
            return Err(HawkError::Query(QueryError {
                info: ErrorInfo::message(
                    "hawkdb.row_width",
                    format!(
                        "row has {} values but the result has {} columns",
                        raw.len(),
                        self.schema.len()
                    ),
                ),
            }));
        }

        let row = raw
            .iter()
            .zip(self.schema.columns())
            .map(|(value, column)| coerce(value.as_deref(), column))
            .collect::<std::result::Result<Row, _>>()?;
        debug_assert_eq!(self.schema.first_mismatch(&row), None);

        self.fetched += 1;
        Ok(Some(row))
    }

    /// Release the cursor; calling it again is a no-op
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close().await?;
            info!("Closed row stream after {} rows", self.fetched);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}
