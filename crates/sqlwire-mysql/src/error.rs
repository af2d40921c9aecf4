//! Error constructors for the MySQL driver.
//!
//! All errors are `sqlwire_core::Error`; these helpers fill in the
//! MySQL-specific codes and SQL states.

use sqlwire_core::Error;
use sqlwire_core::error::{
    ConnectionError, ConnectionErrorKind, ProtocolError, QueryError, QueryErrorKind,
};

use crate::protocol::ErrPacket;

/// Client-side error numbers (CR_xxx / driver specific).
pub mod client_code {
    /// Server closed the connection
    pub const ER_SOCKET_UNEXPECTED_CLOSE: u16 = 45001;
    /// Command issued on a closed connection
    pub const ER_CMD_CONNECTION_CLOSED: u16 = 45013;
    /// LOCAL INFILE request refused by configuration
    pub const ER_LOCAL_INFILE_DISABLED: u16 = 45022;
    /// LOCAL INFILE file could not be read
    pub const ER_LOCAL_INFILE_NOT_READABLE: u16 = 45023;
    /// Placeholder without a bound value
    pub const ER_MISSING_PARAMETER: u16 = 45016;
}

pub const SQLSTATE_LOCAL_INFILE: &str = "22000";
pub const SQLSTATE_PARAMETER: &str = "HY000";

/// Message of the error returned for every command on a closed connection.
pub const CONNECTION_CLOSED_MESSAGE: &str = "Cannot execute new commands: connection closed";

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        sql: None,
        source: None,
    })
}

pub(crate) fn protocol_error_with_data(msg: impl Into<String>, data: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: Some(data.to_vec()),
        sql: None,
        source: None,
    })
}

pub(crate) fn connection_closed() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Closed,
        message: CONNECTION_CLOSED_MESSAGE.to_string(),
        sql: None,
        source: None,
    })
}

pub(crate) fn disconnected(msg: impl Into<String>, source: Option<std::io::Error>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: msg.into(),
        sql: None,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    })
}

/// Map an I/O failure on the transport to a connection error.
pub(crate) fn transport_error(err: std::io::Error) -> Error {
    let msg = match err.kind() {
        std::io::ErrorKind::UnexpectedEof => "socket has unexpectedly been closed".to_string(),
        _ => format!("socket error: {}", err),
    };
    disconnected(msg, Some(err))
}

fn kind_for_code(code: u16) -> QueryErrorKind {
    match code {
        1062 | 1451 | 1452 => QueryErrorKind::Constraint,
        1213 => QueryErrorKind::Deadlock,
        1205 => QueryErrorKind::Timeout,
        1146 | 1054 | 1049 => QueryErrorKind::NotFound,
        1044 | 1045 | 1142 => QueryErrorKind::Permission,
        1064 => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

/// Turn a server ERR packet into a query error.
pub(crate) fn query_error(err: &ErrPacket) -> Error {
    Error::Query(QueryError {
        kind: kind_for_code(err.error_code),
        code: Some(err.error_code),
        sqlstate: (!err.sql_state.is_empty()).then(|| err.sql_state.clone()),
        message: err.error_message.clone(),
        sql: None,
        source: None,
    })
}

pub(crate) fn local_infile_error(code: u16, msg: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::LocalInfile,
        code: Some(code),
        sqlstate: Some(SQLSTATE_LOCAL_INFILE.to_string()),
        message: msg.into(),
        sql: None,
        source: None,
    })
}

pub(crate) fn parameter_error(msg: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Parameter,
        code: Some(client_code::ER_MISSING_PARAMETER),
        sqlstate: Some(SQLSTATE_PARAMETER.to_string()),
        message: msg.into(),
        sql: None,
        source: None,
    })
}
