use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlDatabaseError;
use tracing::debug;

use super::kinds::{ConnectionError, HawkError, QueryError};

/// Structured error information extracted from MySQL driver errors.
///
/// This is serializable so the CLI can print it as JSON when asked.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,
    pub message: String,
}

impl ErrorInfo {
    /// Build an info record from a bare message.
    pub fn message(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            number: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Short explanation of well-known connect failures.
    pub fn hint(&self) -> Option<&'static str> {
        match self.number? {
            1045 => Some("wrong user or password"),
            1049 => Some("unknown database"),
            2003 => Some("server not found"),
            2005 => Some("unknown host"),
            _ => None,
        }
    }

    /// Convert error info to pretty-printed JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.number, &self.sqlstate) {
            (Some(number), Some(state)) => write!(f, "ERROR {number} ({state}): {}", self.message),
            (Some(number), None) => write!(f, "ERROR {number}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Extract structured information from a driver error.
///
/// Server errors keep their MySQL error number, SQLSTATE and message verbatim.
pub fn extract_error_info(error: &sqlx::Error) -> ErrorInfo {
    let info = driver_error_info(error);
    if let Ok(json) = info.to_json() {
        debug!("Driver error: {}", json);
    }
    info
}

fn driver_error_info(error: &sqlx::Error) -> ErrorInfo {
    match error {
        sqlx::Error::Database(db) => {
            let mut info = ErrorInfo::message("mysql.server_error", db.message());
            if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
                info.number = Some(mysql.number());
                info.sqlstate = mysql.code().map(str::to_string);
            } else {
                info.sqlstate = db.code().map(|c| c.into_owned());
            }
            info
        }
        sqlx::Error::Io(e) => ErrorInfo::message("mysql.io", e.to_string()),
        sqlx::Error::Tls(e) => ErrorInfo::message("mysql.tls", e.to_string()),
        sqlx::Error::Protocol(msg) => ErrorInfo::message("mysql.protocol", msg.clone()),
        sqlx::Error::Configuration(e) => ErrorInfo::message("mysql.configuration", e.to_string()),
        other => ErrorInfo::message("mysql.driver", other.to_string()),
    }
}

/// Whether a connect failure is worth retrying with TLS disabled.
pub fn is_transport_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Tls(_) | sqlx::Error::Io(_) | sqlx::Error::Protocol(_)
    )
}

/// Classify an error raised while establishing a connection.
///
/// Everything, including authentication rejected by the server, is a
/// connection failure from the job's point of view.
pub fn connect_error(error: sqlx::Error) -> HawkError {
    HawkError::Connection(ConnectionError::ConnectionFailed(extract_error_info(&error)))
}

/// Classify an error raised while preparing or reading a query.
///
/// Server-side rejections are query errors; transport problems are
/// connection errors.
pub fn query_error(error: sqlx::Error) -> HawkError {
    let info = extract_error_info(&error);
    match error {
        sqlx::Error::Database(_) => HawkError::Query(QueryError { info }),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            HawkError::Connection(ConnectionError::Disconnected(info.message))
        }
        _ => HawkError::Query(QueryError { info }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_display_with_number_and_state() {
        let info = ErrorInfo {
            error_type: "mysql.server_error".into(),
            number: Some(1064),
            sqlstate: Some("42000".into()),
            message: "You have an error in your SQL syntax".into(),
        };
        assert_eq!(
            info.to_string(),
            "ERROR 1064 (42000): You have an error in your SQL syntax"
        );
    }

    #[test]
    fn test_io_errors_are_connection_errors() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(is_transport_error(&err));
        assert_eq!(query_error(err).kind(), ErrorKind::ConnectionError);
    }

    #[test]
    fn test_connect_errors_are_connection_errors() {
        let err = sqlx::Error::Protocol("bad handshake".into());
        let classified = connect_error(err);
        assert_eq!(classified.kind(), ErrorKind::ConnectionError);
        assert!(classified.to_string().contains("bad handshake"));
    }

    #[test]
    fn test_connect_failure_hints() {
        let mut info = ErrorInfo::message("mysql.server_error", "Access denied for user 'app'");
        info.number = Some(1045);
        info.sqlstate = Some("28000".into());
        let err = HawkError::Connection(ConnectionError::ConnectionFailed(info));
        assert_eq!(
            err.to_string(),
            "Connection error: Failed to connect: ERROR 1045 (28000): Access denied for user 'app' (wrong user or password)"
        );

        let mut info = ErrorInfo::message("mysql.server_error", "Can't connect");
        info.number = Some(2003);
        assert_eq!(info.hint(), Some("server not found"));

        let plain = ErrorInfo::message("mysql.io", "connection refused");
        assert_eq!(plain.hint(), None);
        assert_eq!(
            ConnectionError::ConnectionFailed(plain).to_string(),
            "Failed to connect: connection refused"
        );
    }

    #[test]
    fn test_error_info_json() {
        let info = ErrorInfo::message("mysql.io", "broken pipe");
        let json = info.to_json().unwrap();
        assert!(json.contains("\"type\": \"mysql.io\""));
        assert!(!json.contains("sqlstate"));
    }
}
