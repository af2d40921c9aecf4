//! MySQL/MariaDB client protocol engine for sqlwire.
//!
//! This crate implements the command phase of the MySQL wire protocol on
//! an already authenticated connection. It provides:
//!
//! - Packet framing with sequence numbers and 16MB splitting
//! - Text protocol queries with client-side parameter binding
//! - OK / ERR / result set / LOCAL INFILE response handling
//! - Legacy EOF and DEPRECATE_EOF result set terminators
//! - Multi-result chaining and stored procedure OUT parameters
//! - Session state tracking (charset, current database)
//! - Blocking and async connection shells over one protocol engine
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Packets of 16MB - 1 or more are split, a full packet being followed
//!   by another (possibly empty) one
//! - Request/response pairing via sequence numbers
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlwire_mysql::{ConnectionInfo, MySqlConfig, MySqlConnection};
//! use sqlwire_core::Value;
//!
//! // `stream` has completed the handshake; `info` describes the session
//! let mut conn = MySqlConnection::new(stream, MySqlConfig::new(), info);
//! let result = conn.query("SELECT * FROM users WHERE id = ?", &[Value::Int(1)])?;
//! ```

pub mod async_connection;
pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod info;
pub mod protocol;
pub mod types;

pub use async_connection::{MySqlAsyncConnection, SharedMySqlConnection};
pub use command::{
    ChangeResult, CommandExchange, DecodedRow, QueryResult, ResultSet, Response, SessionChange,
};
pub use config::{MySqlConfig, NestTables, QueryOptions, RowShape, TimeZone};
pub use connection::MySqlConnection;
pub use engine::{ConnectionState, ProtocolEngine, Progress};
pub use info::ConnectionInfo;
pub use protocol::Charset;
pub use types::{ColumnDef, FieldType, TextValueDecoder, ValueDecoder};
