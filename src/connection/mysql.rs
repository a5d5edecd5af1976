//! MySQL sessions and cursors
//!
//! A [`MySqlSession`] is one authenticated connection built from a
//! [`ConnectionProfile`] and connect-time [`Credentials`]. Turning it into a
//! [`MySqlCursor`] prepares the query (to learn the column metadata even for
//! empty results) and then runs it unprepared, so rows arrive in the text
//! protocol. Rows are pulled by a background task and handed over through a
//! one-slot channel, which keeps at most one row in flight.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::mysql::{connect_error, is_transport_error, query_error};
use crate::error::{ConnectionError, ErrorInfo, HawkError, QueryError, Result};
use crate::profiles::ConnectionProfile;

use super::{ColumnMeta, Credentials, Cursor, RawRow};

/// An open connection to a MySQL server
pub struct MySqlSession {
    conn: MySqlConnection,
    read_timeout: Duration,
    label: String,
}

impl MySqlSession {
    /// Connect using a profile and connect-time credentials
    ///
    /// The attempt is bounded by the configured connect timeout. When the
    /// TLS handshake fails and `ssl_fallback` is enabled, one more attempt
    /// is made with TLS disabled.
    pub async fn connect(
        profile: &ConnectionProfile,
        credentials: &Credentials,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        profile.validate()?;

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let label = format!("{}@{}:{}", profile.user, profile.host, profile.port);
        let options = connect_options(profile, credentials);

        info!("Connecting to {} (profile '{}')", label, profile.name);

        let conn = match connect_within(&options, timeout).await? {
            Ok(conn) => conn,
            Err(e) if config.ssl_fallback && is_transport_error(&e) => {
                warn!("Connection to {} failed ({}), retrying without TLS", label, e);
                let plain = options.clone().ssl_mode(MySqlSslMode::Disabled);
                connect_within(&plain, timeout).await?.map_err(connect_error)?
            }
            Err(e) => return Err(connect_error(e)),
        };

        debug!("Connected to {}", label);

        Ok(Self {
            conn,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            label,
        })
    }

    /// Server version string, from `SELECT VERSION()`
    pub async fn server_version(&mut self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(query_error)
    }

    /// Run a query and return a cursor over its rows
    ///
    /// The session is consumed; the cursor owns the connection from here on.
    pub async fn open_cursor(mut self, query: &str) -> Result<MySqlCursor> {
        let columns: Vec<ColumnMeta> = {
            let statement = (&mut self.conn).prepare(query).await.map_err(query_error)?;
            statement
                .columns()
                .iter()
                .map(|c| ColumnMeta::new(c.name(), c.type_info().name()))
                .collect()
        };

        if columns.is_empty() {
            return Err(HawkError::Query(QueryError {
                info: ErrorInfo::message(
                    "hawkdb.no_result_set",
                    "statement does not return a result set",
                ),
            }));
        }

        debug!(
            "Prepared query on {}: {} columns",
            self.label,
            columns.len()
        );

        let (tx, rx) = mpsc::channel(1);
        let sql = query.to_string();
        let label = self.label.clone();
        let mut conn = self.conn;

        let task = tokio::spawn(async move {
            if pump_rows(&mut conn, &sql, &tx).await {
                if let Err(e) = conn.close().await {
                    debug!("Closing connection to {} failed: {}", label, e);
                }
            }
            // otherwise the connection is dropped, which closes the socket
        });

        Ok(MySqlCursor {
            columns,
            rx: Some(rx),
            task: Some(task),
            read_timeout: self.read_timeout,
            exhausted: false,
            fetched: 0,
        })
    }

    /// Close the session without running a query
    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(query_error)
    }
}

fn connect_options(profile: &ConnectionProfile, credentials: &Credentials) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&profile.host)
        .port(profile.port)
        .username(&profile.user)
        .password(credentials.password())
        .ssl_mode(MySqlSslMode::Preferred);
    if !profile.database.is_empty() {
        options = options.database(&profile.database);
    }
    options
}

async fn connect_within(
    options: &MySqlConnectOptions,
    timeout: Duration,
) -> Result<std::result::Result<MySqlConnection, sqlx::Error>> {
    tokio::time::timeout(timeout, options.connect())
        .await
        .map_err(|_| {
            ConnectionError::Timeout {
                secs: timeout.as_secs(),
            }
            .into()
        })
}

/// Forward rows into the channel until exhausted, failed, or abandoned
///
/// Returns true only when the result set was read to the end.
async fn pump_rows(
    conn: &mut MySqlConnection,
    sql: &str,
    tx: &mpsc::Sender<Result<RawRow>>,
) -> bool {
    let mut rows = sqlx::raw_sql(sql).fetch(conn);
    loop {
        let item = match rows.try_next().await {
            Ok(Some(row)) => raw_row(&row),
            Ok(None) => return true,
            Err(e) => Err(query_error(e)),
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            debug!("Cursor receiver dropped, abandoning result set");
            return false;
        }
        if failed {
            return false;
        }
    }
}

/// Copy the text-protocol bytes of every column
fn raw_row(row: &MySqlRow) -> Result<RawRow> {
    (0..row.len())
        .map(|i| {
            row.try_get_unchecked::<Option<&[u8]>, _>(i)
                .map(|v| v.map(<[u8]>::to_vec))
                .map_err(query_error)
        })
        .collect()
}

/// Forward-only cursor over a MySQL result set
pub struct MySqlCursor {
    columns: Vec<ColumnMeta>,
    rx: Option<mpsc::Receiver<Result<RawRow>>>,
    task: Option<JoinHandle<()>>,
    read_timeout: Duration,
    exhausted: bool,
    fetched: u64,
}

#[async_trait]
impl Cursor for MySqlCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn fetch_next(&mut self) -> Result<Option<RawRow>> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        match tokio::time::timeout(self.read_timeout, rx.recv()).await {
            Err(_) => Err(ConnectionError::ReadTimeout {
                secs: self.read_timeout.as_secs(),
            }
            .into()),
            Ok(Some(Ok(row))) => {
                self.fetched += 1;
                Ok(Some(row))
            }
            Ok(Some(Err(e))) => {
                self.rx = None;
                Err(e)
            }
            Ok(None) => {
                debug!("Cursor exhausted after {} rows", self.fetched);
                self.rx = None;
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.rx = None;
        if let Some(task) = self.task.take() {
            if !self.exhausted {
                task.abort();
            }
            // a cancelled task is the expected outcome of abort
            let _ = task.await;
            info!("Closed cursor after fetching {} rows", self.fetched);
        }
        Ok(())
    }
}

impl Drop for MySqlCursor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("MySqlCursor dropped without explicit close");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_skip_empty_database() {
        let profile = ConnectionProfile::new("local", "127.0.0.1", 3307, "root", "");
        let options = connect_options(&profile, &Credentials::new("pw"));
        assert_eq!(options.get_host(), "127.0.0.1");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "root");
        assert_eq!(options.get_database(), None);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_profile() {
        let profile = ConnectionProfile::new("broken", "", 3306, "root", "db");
        let result =
            MySqlSession::connect(&profile, &Credentials::default(), &ConnectionConfig::default())
                .await;
        assert!(result.is_err());
    }
}
