//! Blocking MySQL connection.
//!
//! Drives a [`ProtocolEngine`] over any `Read + Write` transport, typically
//! a `std::net::TcpStream` whose handshake was completed elsewhere.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use sqlwire_core::{Result, Value};
use tracing::debug;

use crate::command::{ChangeResult, QueryResult};
use crate::config::{MySqlConfig, QueryOptions};
use crate::engine::{ConnectionState, ProtocolEngine, Progress};
use crate::error::protocol_error;
use crate::info::ConnectionInfo;
use crate::protocol::Command;
use crate::types::ValueDecoder;

/// A MySQL connection over a blocking transport.
pub struct MySqlConnection<S> {
    stream: S,
    engine: ProtocolEngine,
    read_buf: Vec<u8>,
}

impl<S> std::fmt::Debug for MySqlConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("thread_id", &self.engine.info().thread_id)
            .field("state", &self.engine.state())
            .field("database", &self.engine.info().database)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write> MySqlConnection<S> {
    /// Wrap a transport whose session was negotiated as described by `info`.
    pub fn new(stream: S, config: MySqlConfig, info: ConnectionInfo) -> Self {
        let read_buf = vec![0; config.read_chunk_size.max(1)];
        Self {
            stream,
            engine: ProtocolEngine::new(config, info),
            read_buf,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub fn info(&self) -> &ConnectionInfo {
        self.engine.info()
    }

    pub fn config(&self) -> &MySqlConfig {
        self.engine.config()
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// Replace the decoder used for row fields.
    pub fn set_value_decoder(&mut self, decoder: Arc<dyn ValueDecoder>) {
        self.engine.set_value_decoder(decoder);
    }

    /// Run a text-protocol query with the connection's row options.
    #[allow(clippy::result_large_err)]
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.query_with(sql, params, &QueryOptions::default())
    }

    /// Run a text-protocol query, overriding row options for this command.
    #[allow(clippy::result_large_err)]
    pub fn query_with(
        &mut self,
        sql: &str,
        params: &[Value],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        self.engine.start_query(sql, params, options)?;
        self.drive()
    }

    /// Run a statement and return its change summary.
    ///
    /// For multi-statement input the first OK packet wins; statements that
    /// only produced rows report an empty summary.
    #[allow(clippy::result_large_err)]
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ChangeResult> {
        let result = self.query(sql, params)?;
        Ok(result.first_change().cloned().unwrap_or_default())
    }

    #[allow(clippy::result_large_err)]
    pub fn ping(&mut self) -> Result<()> {
        self.command(Command::Ping, None).map(|_| ())
    }

    /// Switch the default database.
    #[allow(clippy::result_large_err)]
    pub fn init_db(&mut self, database: &str) -> Result<()> {
        self.command(Command::InitDb, Some(database)).map(|_| ())
    }

    /// Reset session state on the server without reconnecting.
    #[allow(clippy::result_large_err)]
    pub fn reset_connection(&mut self) -> Result<()> {
        self.command(Command::ResetConnection, None).map(|_| ())
    }

    #[allow(clippy::result_large_err)]
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.query("START TRANSACTION", &[]).map(|_| ())
    }

    /// Commit the open transaction. Without one, nothing is sent.
    #[allow(clippy::result_large_err)]
    pub fn commit(&mut self) -> Result<()> {
        if !self.engine.info().in_transaction() {
            debug!("commit skipped: no transaction in progress");
            return Ok(());
        }
        self.query("COMMIT", &[]).map(|_| ())
    }

    /// Roll back the open transaction. Without one, nothing is sent.
    #[allow(clippy::result_large_err)]
    pub fn rollback(&mut self) -> Result<()> {
        if !self.engine.info().in_transaction() {
            debug!("rollback skipped: no transaction in progress");
            return Ok(());
        }
        self.query("ROLLBACK", &[]).map(|_| ())
    }

    /// Send COM_QUIT and close. Transport errors are ignored.
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<()> {
        self.engine.quit();
        while let Progress::Send(frames) = self.engine.advance() {
            for frame in &frames {
                if self.stream.write_all(frame).is_err() {
                    return Ok(());
                }
            }
        }
        let _ = self.stream.flush();
        Ok(())
    }

    /// Give back the transport.
    pub fn into_inner(self) -> S {
        self.stream
    }

    #[allow(clippy::result_large_err)]
    fn command(&mut self, command: Command, arg: Option<&str>) -> Result<QueryResult> {
        self.engine.start_command(command, arg)?;
        self.drive()
    }

    #[allow(clippy::result_large_err)]
    fn drive(&mut self) -> Result<QueryResult> {
        loop {
            match self.engine.advance() {
                Progress::Send(frames) => {
                    for frame in &frames {
                        if let Err(e) = self.stream.write_all(frame) {
                            return Err(self.engine.transport_failed(e));
                        }
                    }
                    if let Err(e) = self.stream.flush() {
                        return Err(self.engine.transport_failed(e));
                    }
                }
                Progress::NeedInput => match self.stream.read(&mut self.read_buf) {
                    Ok(0) => return Err(self.engine.transport_closed()),
                    Ok(n) => self.engine.receive(&self.read_buf[..n]),
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(self.engine.transport_failed(e)),
                },
                Progress::Done(result) => return result,
                Progress::Idle => return Err(protocol_error("no command in progress")),
            }
        }
    }
}
