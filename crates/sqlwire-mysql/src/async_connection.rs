//! Async MySQL connection over asupersync's TCP stream.
//!
//! [`MySqlAsyncConnection`] drives the same [`ProtocolEngine`] as the
//! blocking connection; only the I/O differs. [`SharedMySqlConnection`]
//! puts a connection behind an async mutex so concurrent tasks take turns,
//! one whole command at a time.

use std::pin::Pin;
use std::sync::Arc;

use asupersync::io::{AsyncRead, AsyncWrite, ReadBuf};
use asupersync::net::TcpStream;
use asupersync::sync::Mutex;
use sqlwire_core::{Cx, Error, Outcome, Value};
use tracing::debug;

use crate::command::{ChangeResult, QueryResult};
use crate::config::{MySqlConfig, QueryOptions};
use crate::engine::{ConnectionState, ProtocolEngine, Progress};
use crate::error::{disconnected, protocol_error};
use crate::info::ConnectionInfo;
use crate::protocol::Command;
use crate::types::ValueDecoder;

/// A MySQL connection over an async TCP stream.
pub struct MySqlAsyncConnection {
    stream: TcpStream,
    engine: ProtocolEngine,
    read_buf: Vec<u8>,
}

impl std::fmt::Debug for MySqlAsyncConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAsyncConnection")
            .field("thread_id", &self.engine.info().thread_id)
            .field("state", &self.engine.state())
            .field("database", &self.engine.info().database)
            .finish_non_exhaustive()
    }
}

impl MySqlAsyncConnection {
    /// Wrap an authenticated stream whose session is described by `info`.
    pub fn new(stream: TcpStream, config: MySqlConfig, info: ConnectionInfo) -> Self {
        stream.set_nodelay(true).ok();
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

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    pub fn set_value_decoder(&mut self, decoder: Arc<dyn ValueDecoder>) {
        self.engine.set_value_decoder(decoder);
    }

    /// Run a text-protocol query with the connection's row options.
    pub async fn query(
        &mut self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<QueryResult, Error> {
        self.query_with(cx, sql, params, &QueryOptions::default())
            .await
    }

    /// Run a text-protocol query, overriding row options for this command.
    pub async fn query_with(
        &mut self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
        options: &QueryOptions,
    ) -> Outcome<QueryResult, Error> {
        if let Err(e) = self.engine.start_query(sql, params, options) {
            return Outcome::Err(e);
        }
        self.drive().await
    }

    /// Run a statement and return its change summary.
    pub async fn execute(
        &mut self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<ChangeResult, Error> {
        match self.query(cx, sql, params).await {
            Outcome::Ok(result) => Outcome::Ok(result.first_change().cloned().unwrap_or_default()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    pub async fn ping(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.command(Command::Ping, None).await
    }

    pub async fn init_db(&mut self, _cx: &Cx, database: &str) -> Outcome<(), Error> {
        self.command(Command::InitDb, Some(database)).await
    }

    pub async fn reset_connection(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.command(Command::ResetConnection, None).await
    }

    pub async fn begin_transaction(&mut self, cx: &Cx) -> Outcome<(), Error> {
        discard(self.execute(cx, "START TRANSACTION", &[]).await)
    }

    /// Commit the open transaction. Without one, nothing is sent.
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if !self.engine.info().in_transaction() {
            debug!("commit skipped: no transaction in progress");
            return Outcome::Ok(());
        }
        discard(self.execute(cx, "COMMIT", &[]).await)
    }

    /// Roll back the open transaction. Without one, nothing is sent.
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if !self.engine.info().in_transaction() {
            debug!("rollback skipped: no transaction in progress");
            return Outcome::Ok(());
        }
        discard(self.execute(cx, "ROLLBACK", &[]).await)
    }

    /// Send COM_QUIT and close. Transport errors are ignored.
    pub async fn close(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.engine.quit();
        while let Progress::Send(frames) = self.engine.advance() {
            for frame in &frames {
                if write_all(&mut self.stream, frame).await.is_err() {
                    return Outcome::Ok(());
                }
            }
        }
        Outcome::Ok(())
    }

    async fn command(&mut self, command: Command, arg: Option<&str>) -> Outcome<(), Error> {
        if let Err(e) = self.engine.start_command(command, arg) {
            return Outcome::Err(e);
        }
        discard(self.drive().await)
    }

    async fn drive(&mut self) -> Outcome<QueryResult, Error> {
        loop {
            match self.engine.advance() {
                Progress::Send(frames) => {
                    for frame in &frames {
                        if let Err(e) = write_all(&mut self.stream, frame).await {
                            return Outcome::Err(self.engine.transport_failed(e));
                        }
                    }
                    let stream = &mut self.stream;
                    if let Err(e) =
                        std::future::poll_fn(|cx| Pin::new(&mut *stream).poll_flush(cx)).await
                    {
                        return Outcome::Err(self.engine.transport_failed(e));
                    }
                }
                Progress::NeedInput => {
                    let stream = &mut self.stream;
                    let mut read_buf = ReadBuf::new(&mut self.read_buf);
                    match std::future::poll_fn(|cx| {
                        Pin::new(&mut *stream).poll_read(cx, &mut read_buf)
                    })
                    .await
                    {
                        Ok(()) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                return Outcome::Err(self.engine.transport_closed());
                            }
                            self.engine.receive(&self.read_buf[..n]);
                        }
                        Err(e) => return Outcome::Err(self.engine.transport_failed(e)),
                    }
                }
                Progress::Done(Ok(result)) => return Outcome::Ok(result),
                Progress::Done(Err(e)) => return Outcome::Err(e),
                Progress::Idle => return Outcome::Err(protocol_error("no command in progress")),
            }
        }
    }
}

fn discard<T>(outcome: Outcome<T, Error>) -> Outcome<(), Error> {
    match outcome {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Write a whole frame, looping over partial writes.
async fn write_all(stream: &mut TcpStream, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        let n = std::future::poll_fn(|cx| Pin::new(&mut *stream).poll_write(cx, data)).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
    }
    Ok(())
}

/// A connection shared between tasks.
///
/// Each call locks the connection for the whole command, so commands from
/// different tasks never interleave on the wire.
pub struct SharedMySqlConnection {
    inner: Arc<Mutex<MySqlAsyncConnection>>,
}

impl SharedMySqlConnection {
    pub fn new(conn: MySqlAsyncConnection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Get the inner Arc for cloning.
    pub fn inner(&self) -> &Arc<Mutex<MySqlAsyncConnection>> {
        &self.inner
    }

    pub async fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<QueryResult, Error> {
        let mut guard = match self.inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(lock_error()),
        };
        guard.query(cx, sql, params).await
    }

    pub async fn query_with(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
        options: &QueryOptions,
    ) -> Outcome<QueryResult, Error> {
        let mut guard = match self.inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(lock_error()),
        };
        guard.query_with(cx, sql, params, options).await
    }

    pub async fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<ChangeResult, Error> {
        let mut guard = match self.inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(lock_error()),
        };
        guard.execute(cx, sql, params).await
    }

    pub async fn ping(&self, cx: &Cx) -> Outcome<(), Error> {
        let mut guard = match self.inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(lock_error()),
        };
        guard.ping(cx).await
    }

    pub async fn close(&self, cx: &Cx) -> Outcome<(), Error> {
        let mut guard = match self.inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(lock_error()),
        };
        guard.close(cx).await
    }
}

fn lock_error() -> Error {
    disconnected("Failed to acquire connection lock", None)
}

impl Clone for SharedMySqlConnection {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for SharedMySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMySqlConnection")
            .field("inner", &"Arc<Mutex<MySqlAsyncConnection>>")
            .finish()
    }
}
