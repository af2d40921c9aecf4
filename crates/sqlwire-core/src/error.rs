//! Error types for sqlwire operations.

use std::fmt;

/// SQLSTATE reported for client-side connection failures.
pub const SQLSTATE_CONNECTION_FAILURE: &str = "08S01";

/// The primary error type for all sqlwire operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (transport lost, connection closed)
    Connection(ConnectionError),
    /// Query execution errors (server ERR packets, client-side command failures)
    Query(QueryError),
    /// Protocol errors (wire-level desynchronisation)
    Protocol(ProtocolError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation timed out
    Timeout,
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Transport closed or failed while a command was in flight
    Disconnected,
    /// Command issued after the connection was closed or became unusable
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    /// Server (or client-side) error number
    pub code: Option<u16>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Deadlock detected
    Deadlock,
    /// Lock wait or statement timeout
    Timeout,
    /// LOCAL INFILE request refused or file unreadable
    LocalInfile,
    /// Placeholder without a bound parameter
    Parameter,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Does this error leave the connection unusable?
    ///
    /// Server-reported SQL errors only fail the current command; protocol
    /// desynchronisation and transport loss poison the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Protocol(_) | Error::Io(_)
        )
    }

    /// Is this a retryable error (deadlock, lock timeout)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Deadlock | QueryErrorKind::Timeout),
            Error::Timeout => true,
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_) | Error::Io(_))
    }

    /// Get SQLSTATE if available (e.g., "23000" for duplicate key)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Connection(_) => Some(SQLSTATE_CONNECTION_FAILURE),
            _ => None,
        }
    }

    /// Get the error number if available.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Query(q) => q.code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Protocol(p) => p.sql.as_deref(),
            Error::Connection(c) => c.sql.as_deref(),
            _ => None,
        }
    }

    /// Attach a diagnostic rendering of the originating SQL.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let sql = Some(sql.into());
        match &mut self {
            Error::Query(q) => q.sql = sql,
            Error::Protocol(p) => p.sql = sql,
            Error::Connection(c) => c.sql = sql,
            _ => {}
        }
        self
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_duplicate_key(&self) -> bool {
        self.code == Some(1062)
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self.code, Some(1451 | 1452))
    }
}

fn write_sql(f: &mut fmt::Formatter<'_>, sql: Option<&String>) -> fmt::Result {
    match sql {
        Some(sql) => write!(f, "\n{}", sql),
        None => Ok(()),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)?;
                } else {
                    write!(f, "Query error: {}", e.message)?;
                }
                write_sql(f, e.sql.as_ref())
            }
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        write_sql(f, self.sql.as_ref())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        write_sql(f, self.sql.as_ref())
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        write_sql(f, self.sql.as_ref())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlwire operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(code: u16, sqlstate: &str) -> QueryError {
        QueryError {
            kind: QueryErrorKind::Constraint,
            code: Some(code),
            sqlstate: Some(sqlstate.to_string()),
            message: "Duplicate entry '1' for key 'PRIMARY'".to_string(),
            sql: None,
            source: None,
        }
    }

    #[test]
    fn sqlstate_and_code_helpers() {
        let query = server_error(1062, "23000");
        assert!(query.is_duplicate_key());
        assert!(!query.is_foreign_key_violation());

        let err = Error::Query(query).with_sql("sql: INSERT INTO t VALUES (1) - parameters:[]");
        assert_eq!(err.sqlstate(), Some("23000"));
        assert_eq!(err.code(), Some(1062));
        assert_eq!(
            err.sql(),
            Some("sql: INSERT INTO t VALUES (1) - parameters:[]")
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("parameters:[]"));
    }

    #[test]
    fn fatal_classification() {
        let closed = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Closed,
            message: "Cannot execute new commands: connection closed".to_string(),
            sql: None,
            source: None,
        });
        assert!(closed.is_fatal());
        assert!(closed.is_connection_error());
        assert_eq!(closed.sqlstate(), Some(SQLSTATE_CONNECTION_FAILURE));

        let desync = Error::Protocol(ProtocolError {
            message: "Error in protocol, expected EOF packet".to_string(),
            raw_data: None,
            sql: None,
            source: None,
        });
        assert!(desync.is_fatal());

        let deadlock = Error::Query(QueryError {
            kind: QueryErrorKind::Deadlock,
            code: Some(1213),
            sqlstate: Some("40001".to_string()),
            message: "Deadlock found".to_string(),
            sql: None,
            source: None,
        });
        assert!(deadlock.is_retryable());
        assert!(!deadlock.is_fatal());
    }
}
