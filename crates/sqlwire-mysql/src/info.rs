//! Connection/session state shared by successive commands.

use crate::protocol::Charset;
use crate::protocol::capabilities::{CLIENT_DEPRECATE_EOF, DEFAULT_CLIENT_FLAGS};
use crate::protocol::server_status::{
    SERVER_MORE_RESULTS_EXISTS, SERVER_STATUS_AUTOCOMMIT, SERVER_STATUS_IN_TRANS,
};

/// Negotiated session state.
///
/// Built by whatever performed the handshake, then owned by the connection
/// and updated only by the command currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Server connection (thread) id
    pub thread_id: u32,
    /// Negotiated capability flags
    pub capabilities: u32,
    /// Last server status flags seen
    pub status: u16,
    /// Active connection charset, seeded from `MySqlConfig::charset`
    pub charset: Charset,
    /// Current default database
    pub database: Option<String>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            thread_id: 0,
            capabilities: DEFAULT_CLIENT_FLAGS,
            status: SERVER_STATUS_AUTOCOMMIT,
            charset: Charset::Utf8mb4,
            database: None,
        }
    }
}

impl ConnectionInfo {
    pub fn new(thread_id: u32, capabilities: u32) -> Self {
        Self {
            thread_id,
            capabilities,
            ..Self::default()
        }
    }

    /// Set the current database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the server status flags.
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Whether result sets omit the intermediate EOF packet.
    pub fn eof_deprecated(&self) -> bool {
        self.capabilities & CLIENT_DEPRECATE_EOF != 0
    }

    pub fn in_transaction(&self) -> bool {
        self.status & SERVER_STATUS_IN_TRANS != 0
    }

    pub fn autocommit(&self) -> bool {
        self.status & SERVER_STATUS_AUTOCOMMIT != 0
    }

    pub fn more_results(&self) -> bool {
        self.status & SERVER_MORE_RESULTS_EXISTS != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let info = ConnectionInfo::new(7, DEFAULT_CLIENT_FLAGS & !CLIENT_DEPRECATE_EOF)
            .status(SERVER_STATUS_IN_TRANS | SERVER_MORE_RESULTS_EXISTS)
            .database("testdb");
        assert!(!info.eof_deprecated());
        assert!(info.in_transaction());
        assert!(!info.autocommit());
        assert!(info.more_results());
        assert_eq!(info.database.as_deref(), Some("testdb"));

        let info = ConnectionInfo::default();
        assert!(info.eof_deprecated());
        assert!(info.autocommit());
    }
}
