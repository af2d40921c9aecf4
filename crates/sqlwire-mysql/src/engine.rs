//! Transport-independent protocol engine.
//!
//! The engine owns everything about a connection except the socket: the
//! packet writer, the frame assembler, the negotiated session state and the
//! exchange of the command in flight. Callers push bytes in with
//! [`ProtocolEngine::receive`] and pull work out with
//! [`ProtocolEngine::advance`], which lets the blocking and the async
//! connection share one implementation.
//!
//! Any fatal error (protocol desynchronisation, transport loss) closes the
//! engine for good: later commands fail immediately without touching the
//! transport.

use std::sync::Arc;

use sqlwire_core::{Error, Result, Value};
use tracing::{debug, info, warn};

use crate::command::local_infile::{self, InfileStep, LocalInfile};
use crate::command::query::{display_sql, write_query, write_simple_command};
use crate::command::{CommandExchange, QueryResult, SessionChange, Step};
use crate::config::{MySqlConfig, QueryOptions, RowShape};
use crate::error::{connection_closed, protocol_error, transport_error};
use crate::info::ConnectionInfo;
use crate::protocol::{Command, FrameAssembler, PacketWriter};
use crate::types::{TextValueDecoder, ValueDecoder};

/// Connection lifecycle as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for a new command
    Ready,
    /// A command is in flight
    InCommand,
    /// Closed by the client or after a fatal error
    Closed,
}

/// Next thing the driver has to do.
#[derive(Debug)]
pub enum Progress {
    /// Write these frames, in order, before anything else.
    Send(Vec<Vec<u8>>),
    /// Read more bytes from the transport and pass them to `receive`.
    NeedInput,
    /// The command in flight resolved.
    Done(Result<QueryResult>),
    /// Nothing in flight and nothing to send.
    Idle,
}

/// Follow-up applied to the session once a command succeeds.
#[derive(Debug)]
enum OnSuccess {
    Nothing,
    SetDatabase(String),
}

#[derive(Debug)]
struct ActiveCommand {
    exchange: CommandExchange,
    display: String,
    on_success: OnSuccess,
    upload: Option<LocalInfile>,
}

/// Protocol state of one connection.
pub struct ProtocolEngine {
    config: MySqlConfig,
    info: ConnectionInfo,
    writer: PacketWriter,
    assembler: FrameAssembler,
    state: ConnectionState,
    decoder: Arc<dyn ValueDecoder>,
    active: Option<ActiveCommand>,
    last_changes: Vec<SessionChange>,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("thread_id", &self.info.thread_id)
            .field("state", &self.state)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl ProtocolEngine {
    /// Create an engine for an already negotiated session.
    ///
    /// The session starts in `config.charset`; later charset changes arrive
    /// through session tracking.
    pub fn new(config: MySqlConfig, mut info: ConnectionInfo) -> Self {
        info.charset = config.charset;
        Self {
            writer: PacketWriter::new(info.charset),
            config,
            info,
            assembler: FrameAssembler::new(),
            state: ConnectionState::Ready,
            decoder: Arc::new(TextValueDecoder),
            active: None,
            last_changes: Vec::new(),
        }
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Session changes reported by the last completed command.
    pub fn session_changes(&self) -> &[SessionChange] {
        &self.last_changes
    }

    /// Replace the decoder used for row fields of subsequent commands.
    pub fn set_value_decoder(&mut self, decoder: Arc<dyn ValueDecoder>) {
        self.decoder = decoder;
    }

    #[allow(clippy::result_large_err)]
    fn ensure_ready(&mut self, display: &str) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(connection_closed().with_sql(display)),
            ConnectionState::InCommand => {
                // The previous command was abandoned part way; its remaining
                // packets would be read as this command's response.
                let err = protocol_error("previous command did not complete");
                Err(self.fail(err).with_sql(display))
            }
        }
    }

    /// Queue a COM_QUERY with `params` bound to its placeholders.
    #[allow(clippy::result_large_err)]
    pub fn start_query(
        &mut self,
        sql: &str,
        params: &[Value],
        options: &QueryOptions,
    ) -> Result<()> {
        let display = display_sql(sql, params, self.config.debug_len);
        self.ensure_ready(&display)?;

        self.writer.start_packet(0);
        write_query(&mut self.writer, sql, params, self.config.timezone)
            .map_err(|e| e.with_sql(display.clone()))?;

        let shape = self.config.row_shape(options);
        self.dispatch(display, shape, OnSuccess::Nothing);
        Ok(())
    }

    /// Queue a command without parameters (COM_PING, COM_INIT_DB, ...).
    ///
    /// COM_QUIT closes the engine once its frame is sent; no response is
    /// awaited.
    #[allow(clippy::result_large_err)]
    pub fn start_command(&mut self, command: Command, arg: Option<&str>) -> Result<()> {
        if !command.expects_response() {
            self.quit();
            return Ok(());
        }

        let display = match arg {
            Some(arg) => format!("{:?} {}", command, arg),
            None => format!("{:?}", command),
        };
        self.ensure_ready(&display)?;

        self.writer.start_packet(0);
        write_simple_command(&mut self.writer, command, arg);

        let on_success = match (command, arg) {
            (Command::InitDb, Some(db)) => OnSuccess::SetDatabase(db.to_string()),
            _ => OnSuccess::Nothing,
        };
        let shape = self.config.row_shape(&QueryOptions::default());
        self.dispatch(display, shape, on_success);
        Ok(())
    }

    fn dispatch(&mut self, sql: String, shape: RowShape, on_success: OnSuccess) {
        self.writer.flush_buffer(true);
        self.assembler.expect_sequence(self.writer.sequence());
        debug!(thread_id = self.info.thread_id, sql = %sql, "command sent");
        self.active = Some(ActiveCommand {
            exchange: CommandExchange::new(shape, Arc::clone(&self.decoder)),
            display: sql,
            on_success,
            upload: None,
        });
        self.state = ConnectionState::InCommand;
    }

    /// Queue COM_QUIT and close the engine. Does nothing once closed.
    pub fn quit(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.active = None;
        self.assembler.clear();
        self.writer.start_packet(0);
        write_simple_command(&mut self.writer, Command::Quit, None);
        self.writer.flush_buffer(true);
        self.state = ConnectionState::Closed;
        info!(thread_id = self.info.thread_id, "connection closed");
    }

    /// Hand bytes read from the transport to the engine.
    pub fn receive(&mut self, data: &[u8]) {
        self.assembler.push(data);
    }

    /// Drive the command in flight as far as the buffered input allows.
    pub fn advance(&mut self) -> Progress {
        loop {
            let frames = self.writer.take_frames();
            if !frames.is_empty() {
                return Progress::Send(frames);
            }

            let Some(active) = self.active.as_mut() else {
                return Progress::Idle;
            };

            if let Some(upload) = active.upload.as_mut() {
                match upload.step(&mut self.writer) {
                    InfileStep::More => continue,
                    InfileStep::Done => {}
                    InfileStep::Failed(err) => active.exchange.fail_after_response(err),
                }
                active.upload = None;
                self.assembler.expect_sequence(self.writer.sequence());
                continue;
            }

            let packet = match self.assembler.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Progress::NeedInput,
                Err(err) => return Progress::Done(Err(self.fail(err))),
            };

            match active.exchange.on_packet(&packet.payload, &mut self.info) {
                Ok(Step::Await) => {}
                Ok(Step::LocalInfile(file)) => {
                    self.writer.start_packet(packet.sequence_id.wrapping_add(1));
                    if !self.config.local_infile {
                        let err = local_infile::refuse(&mut self.writer, &file);
                        active.exchange.fail_after_response(err);
                    } else {
                        match LocalInfile::open(&file) {
                            Ok(upload) => active.upload = Some(upload),
                            Err(err) => {
                                warn!(file = %file, error = %err, "local infile not readable");
                                let err = local_infile::abort(&mut self.writer, err);
                                active.exchange.fail_after_response(err);
                            }
                        }
                    }
                    self.assembler.expect_sequence(self.writer.sequence());
                }
                Ok(Step::Done(result)) => return Progress::Done(self.complete(result)),
                Err(err) => return Progress::Done(Err(self.fail(err))),
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn complete(&mut self, result: Result<QueryResult>) -> Result<QueryResult> {
        self.state = ConnectionState::Ready;
        self.writer.set_charset(self.info.charset);
        let Some(active) = self.active.take() else {
            return result;
        };
        self.last_changes = active.exchange.session_changes().to_vec();

        match result {
            Ok(value) => {
                if let OnSuccess::SetDatabase(db) = active.on_success {
                    self.info.database = Some(db);
                }
                Ok(value)
            }
            Err(err) => {
                debug!(thread_id = self.info.thread_id, error = %err, "command failed");
                Err(err.with_sql(active.display))
            }
        }
    }

    /// Close the engine after a fatal error, returning the error with the
    /// failing command's SQL attached.
    fn fail(&mut self, err: Error) -> Error {
        let display = self.active.take().map(|a| a.display);
        self.state = ConnectionState::Closed;
        self.assembler.clear();
        self.writer.take_frames();
        self.writer.start_packet(0);
        warn!(
            thread_id = self.info.thread_id,
            error = %err,
            "connection is no longer usable"
        );
        match display {
            Some(sql) => err.with_sql(sql),
            None => err,
        }
    }

    /// The transport reported end of stream.
    pub fn transport_closed(&mut self) -> Error {
        self.transport_failed(std::io::ErrorKind::UnexpectedEof.into())
    }

    /// The transport failed with an I/O error.
    pub fn transport_failed(&mut self, err: std::io::Error) -> Error {
        self.fail(transport_error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::{legacy_eof, ok_payload, ok_terminator, text_row};
    use crate::error::client_code;
    use crate::protocol::{Charset, PacketHeader};
    use crate::protocol::server_status::SERVER_STATUS_AUTOCOMMIT;
    use crate::types::tests::column_def_payload;
    use crate::types::FieldType;
    use sqlwire_core::error::ConnectionErrorKind;

    fn frame(sequence: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id: sequence,
        }
        .to_bytes()
        .to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn engine(config: MySqlConfig) -> ProtocolEngine {
        ProtocolEngine::new(config, ConnectionInfo::new(42, crate::protocol::capabilities::DEFAULT_CLIENT_FLAGS))
    }

    fn expect_send(engine: &mut ProtocolEngine) -> Vec<Vec<u8>> {
        match engine.advance() {
            Progress::Send(frames) => frames,
            other => panic!("expected frames, got {other:?}"),
        }
    }

    fn expect_done(engine: &mut ProtocolEngine) -> Result<QueryResult> {
        match engine.advance() {
            Progress::Done(result) => result,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_query_round_trip() {
        let mut engine = engine(MySqlConfig::default());
        engine
            .start_query("SELECT ?", &[Value::Int(1)], &QueryOptions::default())
            .unwrap();
        assert_eq!(engine.state(), ConnectionState::InCommand);
        assert_eq!(expect_send(&mut engine), vec![frame(0, b"\x03SELECT 1")]);
        assert!(matches!(engine.advance(), Progress::NeedInput));

        let mut input = frame(1, &[0x01]);
        input.extend(frame(2, &column_def_payload("", "1", FieldType::LongLong, 0)));
        input.extend(frame(3, &text_row(&[Some("1")])));
        input.extend(frame(4, &ok_terminator(SERVER_STATUS_AUTOCOMMIT)));
        // split delivery exercises reassembly across reads
        let (a, b) = input.split_at(7);
        engine.receive(a);
        assert!(matches!(engine.advance(), Progress::NeedInput));
        engine.receive(b);

        let result = expect_done(&mut engine).unwrap();
        assert_eq!(result.first_rows().unwrap().rows[0].get("1"), Some(&Value::BigInt(1)));
        assert_eq!(engine.state(), ConnectionState::Ready);
        assert!(matches!(engine.advance(), Progress::Idle));
    }

    #[test]
    fn test_out_of_order_sequence_closes_engine() {
        let mut engine = engine(MySqlConfig::default());
        engine.start_query("DO 1", &[], &QueryOptions::default()).unwrap();
        expect_send(&mut engine);
        engine.receive(&frame(5, &ok_payload(0, 0, SERVER_STATUS_AUTOCOMMIT)));
        let err = expect_done(&mut engine).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.sql().unwrap().contains("DO 1"));
        assert!(engine.is_closed());

        let err = engine.start_query("DO 2", &[], &QueryOptions::default()).unwrap_err();
        assert!(matches!(&err, Error::Connection(c) if c.kind == ConnectionErrorKind::Closed));
        assert!(matches!(engine.advance(), Progress::Idle));
    }

    #[test]
    fn test_missing_parameter_keeps_engine_ready() {
        let mut engine = engine(MySqlConfig::default());
        let err = engine
            .start_query("SELECT ?, ?", &[Value::Int(1)], &QueryOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), Some(client_code::ER_MISSING_PARAMETER));
        assert_eq!(engine.state(), ConnectionState::Ready);
        assert!(matches!(engine.advance(), Progress::Idle));
    }

    #[test]
    fn test_transport_closed_mid_result() {
        let mut engine = engine(MySqlConfig::default());
        engine.start_query("SELECT 1", &[], &QueryOptions::default()).unwrap();
        expect_send(&mut engine);
        engine.receive(&frame(1, &[0x01]));
        assert!(matches!(engine.advance(), Progress::NeedInput));

        let err = engine.transport_closed();
        assert!(matches!(&err, Error::Connection(c) if c.kind == ConnectionErrorKind::Disconnected));
        assert_eq!(err.sqlstate(), Some("08S01"));
        assert!(engine.is_closed());
    }

    #[test]
    fn test_init_db_updates_database() {
        let mut engine = engine(MySqlConfig::default());
        engine.start_command(Command::InitDb, Some("shop")).unwrap();
        assert_eq!(expect_send(&mut engine), vec![frame(0, b"\x02shop")]);
        engine.receive(&frame(1, &ok_payload(0, 0, SERVER_STATUS_AUTOCOMMIT)));
        expect_done(&mut engine).unwrap();
        assert_eq!(engine.info().database.as_deref(), Some("shop"));
    }

    #[test]
    fn test_quit_sends_once() {
        let mut engine = engine(MySqlConfig::default());
        engine.start_command(Command::Quit, None).unwrap();
        assert_eq!(expect_send(&mut engine), vec![frame(0, &[0x01])]);
        assert!(engine.is_closed());
        engine.quit();
        assert!(matches!(engine.advance(), Progress::Idle));
    }

    #[test]
    fn test_disabled_local_infile() {
        let mut engine = engine(MySqlConfig::default());
        engine
            .start_query("LOAD DATA LOCAL INFILE 'x.csv' INTO TABLE t", &[], &QueryOptions::default())
            .unwrap();
        expect_send(&mut engine);

        let mut request = vec![0xFB];
        request.extend_from_slice(b"x.csv");
        engine.receive(&frame(1, &request));
        assert_eq!(expect_send(&mut engine), vec![vec![0, 0, 0, 2]]);
        assert!(matches!(engine.advance(), Progress::NeedInput));

        let mut err_packet = vec![0xFF, 0x2C, 0x04, b'#'];
        err_packet.extend_from_slice(b"HY000Lost data");
        engine.receive(&frame(3, &err_packet));
        let err = expect_done(&mut engine).unwrap_err();
        assert_eq!(err.code(), Some(client_code::ER_LOCAL_INFILE_DISABLED));
        assert!(!engine.is_closed());
    }

    #[test]
    fn test_configured_charset_encodes_parameters() {
        let mut engine = engine(MySqlConfig::new().charset(Charset::Latin1));
        assert_eq!(engine.info().charset, Charset::Latin1);
        engine
            .start_query("SELECT ?", &[Value::Text("café".into())], &QueryOptions::default())
            .unwrap();
        assert_eq!(
            expect_send(&mut engine),
            vec![frame(0, b"\x03SELECT 'caf\xE9'")]
        );
    }

    #[test]
    fn test_legacy_eof_session() {
        let info = ConnectionInfo::new(
            1,
            crate::protocol::capabilities::DEFAULT_CLIENT_FLAGS
                & !crate::protocol::capabilities::CLIENT_DEPRECATE_EOF,
        );
        let mut engine = ProtocolEngine::new(MySqlConfig::default().rows_as_array(true), info);
        engine.start_query("SELECT 'a'", &[], &QueryOptions::default()).unwrap();
        expect_send(&mut engine);
        let mut input = frame(1, &[0x01]);
        input.extend(frame(2, &column_def_payload("", "a", FieldType::VarString, 0)));
        input.extend(frame(3, &legacy_eof(SERVER_STATUS_AUTOCOMMIT)));
        input.extend(frame(4, &text_row(&[Some("a")])));
        input.extend(frame(5, &legacy_eof(SERVER_STATUS_AUTOCOMMIT)));
        engine.receive(&input);
        let result = expect_done(&mut engine).unwrap();
        assert_eq!(
            result.first_rows().unwrap().rows[0],
            crate::command::DecodedRow::Array(vec![Value::Text("a".into())])
        );
    }
}
