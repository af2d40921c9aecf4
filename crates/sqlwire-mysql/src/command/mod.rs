//! Command/response exchanges.
//!
//! A [`CommandExchange`] consumes the logical packets answering one
//! command and folds them into a [`QueryResult`]:
//!
//! ```text
//! AwaitingResponse --OK/ERR--> done (or next response on MORE_RESULTS)
//!        |  --0xFB--> local infile upload, then AwaitingResponse
//!        |  --column count--> ReadingColumns
//! ReadingColumns --n definitions--> LegacyEof (no DEPRECATE_EOF) | ReadingRows
//! LegacyEof --EOF--> ReadingRows
//! ReadingRows --row--> ReadingRows
//!             --terminator--> AwaitingResponse (more results) | done
//! ```
//!
//! Server ERR packets fail the command but leave the connection usable.
//! Every other `Err` returned by [`CommandExchange::on_packet`] means the
//! stream can no longer be trusted.

pub mod local_infile;
pub mod query;
pub mod result;
pub mod session;

use std::sync::Arc;

use sqlwire_core::{Error, Result};
use tracing::{debug, trace};

use crate::config::RowShape;
use crate::error::{protocol_error, protocol_error_with_data, query_error};
use crate::info::ConnectionInfo;
use crate::protocol::server_status::{
    SERVER_MORE_RESULTS_EXISTS, SERVER_PS_OUT_PARAMS, SERVER_SESSION_STATE_CHANGED,
    SERVER_STATUS_IN_TRANS,
};
use crate::protocol::{MAX_PACKET_SIZE, PacketReader, capabilities, header};
use crate::types::{ColumnDef, ValueDecoder, parse_text_row};

pub use local_infile::{InfileStep, LocalInfile};
pub use result::{ChangeResult, DecodedRow, QueryResult, ResultSet, Response};
pub use session::SessionChange;

use result::RowHeader;

/// Legacy EOF packets are shorter than this; longer 0xFE packets are rows.
const LEGACY_EOF_MAX_LEN: usize = 13;

/// What the driver must do after a packet was consumed.
#[derive(Debug)]
pub enum Step {
    /// Wait for the next packet.
    Await,
    /// The server asked for a client file. Upload it (or refuse) and keep
    /// feeding packets; the final OK/ERR follows the upload.
    LocalInfile(String),
    /// The command finished. An `Err` here is a server or client-side
    /// command failure, never a fatal one.
    Done(Result<QueryResult>),
}

#[derive(Debug)]
enum ExchangeState {
    AwaitingResponse,
    ReadingColumns {
        expected: usize,
        columns: Vec<ColumnDef>,
    },
    LegacyEof {
        columns: Vec<ColumnDef>,
    },
    ReadingRows {
        columns: Arc<[ColumnDef]>,
        header: RowHeader,
        rows: Vec<DecodedRow>,
    },
    Finished,
}

impl ExchangeState {
    fn name(&self) -> &'static str {
        match self {
            ExchangeState::AwaitingResponse => "awaiting_response",
            ExchangeState::ReadingColumns { .. } => "reading_columns",
            ExchangeState::LegacyEof { .. } => "legacy_eof",
            ExchangeState::ReadingRows { .. } => "reading_rows",
            ExchangeState::Finished => "finished",
        }
    }
}

/// Response state machine for a single command.
pub struct CommandExchange {
    state: ExchangeState,
    shape: RowShape,
    decoder: Arc<dyn ValueDecoder>,
    responses: Vec<Response>,
    out_params: bool,
    pending_error: Option<Error>,
    changes: Vec<SessionChange>,
}

impl std::fmt::Debug for CommandExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExchange")
            .field("state", &self.state.name())
            .field("shape", &self.shape)
            .field("responses", &self.responses.len())
            .field("pending_error", &self.pending_error.is_some())
            .finish_non_exhaustive()
    }
}

impl CommandExchange {
    pub fn new(shape: RowShape, decoder: Arc<dyn ValueDecoder>) -> Self {
        Self {
            state: ExchangeState::AwaitingResponse,
            shape,
            decoder,
            responses: Vec::new(),
            out_params: false,
            pending_error: None,
            changes: Vec::new(),
        }
    }

    /// Whether the final response has been consumed.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ExchangeState::Finished)
    }

    /// Record a client-side failure (e.g. a refused LOCAL INFILE). The
    /// exchange still runs to the server's final response, then resolves
    /// with this error.
    pub fn fail_after_response(&mut self, err: Error) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
    }

    /// Session changes reported by OK packets so far.
    pub fn session_changes(&self) -> &[SessionChange] {
        &self.changes
    }

    /// Consume one logical packet.
    #[allow(clippy::result_large_err)]
    pub fn on_packet(&mut self, payload: &[u8], info: &mut ConnectionInfo) -> Result<Step> {
        let state = std::mem::replace(&mut self.state, ExchangeState::Finished);
        let result = self.transition(state, payload, info);
        if result.is_err() {
            self.state = ExchangeState::Finished;
        }
        result
    }

    #[allow(clippy::result_large_err)]
    fn transition(
        &mut self,
        state: ExchangeState,
        payload: &[u8],
        info: &mut ConnectionInfo,
    ) -> Result<Step> {
        match state {
            ExchangeState::AwaitingResponse => self.read_response(payload, info),
            ExchangeState::ReadingColumns {
                expected,
                mut columns,
            } => {
                columns.push(ColumnDef::parse(payload, info.charset)?);
                if columns.len() < expected {
                    self.state = ExchangeState::ReadingColumns { expected, columns };
                } else if info.eof_deprecated() {
                    self.start_rows(columns);
                } else {
                    self.state = ExchangeState::LegacyEof { columns };
                }
                Ok(Step::Await)
            }
            ExchangeState::LegacyEof { columns } => {
                self.read_intermediate_eof(payload, info)?;
                self.start_rows(columns);
                Ok(Step::Await)
            }
            ExchangeState::ReadingRows {
                columns,
                header,
                mut rows,
            } => {
                if payload.first() == Some(&header::ERR) {
                    return self.read_error(payload, info);
                }
                if is_rows_terminator(payload, info.eof_deprecated()) {
                    let status = read_terminator_status(payload, info.eof_deprecated())?;
                    info.status = status;
                    let out_params = self.out_params || status & SERVER_PS_OUT_PARAMS != 0;
                    debug!(
                        rows = rows.len(),
                        columns = columns.len(),
                        status,
                        out_params,
                        "result set complete"
                    );
                    self.responses.push(Response::Rows(ResultSet {
                        columns,
                        rows,
                        out_params,
                    }));
                    if status & SERVER_MORE_RESULTS_EXISTS != 0 || out_params {
                        self.state = ExchangeState::AwaitingResponse;
                        return Ok(Step::Await);
                    }
                    return Ok(self.resolve(None));
                }

                let values = parse_text_row(payload, &columns, self.decoder.as_ref())?;
                rows.push(header.make_row(values));
                self.state = ExchangeState::ReadingRows {
                    columns,
                    header,
                    rows,
                };
                Ok(Step::Await)
            }
            ExchangeState::Finished => Err(protocol_error_with_data(
                "unexpected packet after command completion",
                payload,
            )),
        }
    }

    #[allow(clippy::result_large_err)]
    fn read_response(&mut self, payload: &[u8], info: &mut ConnectionInfo) -> Result<Step> {
        let Some(&first) = payload.first() else {
            return Err(protocol_error("empty response packet"));
        };
        match first {
            header::OK => self.read_ok(payload, info),
            header::ERR => self.read_error(payload, info),
            header::LOCAL_INFILE => {
                let mut reader = PacketReader::new(payload);
                reader.skip(1)?;
                let file = reader.read_string_remaining(info.charset);
                debug!(file = %file, "LOCAL INFILE requested");
                self.state = ExchangeState::AwaitingResponse;
                Ok(Step::LocalInfile(file))
            }
            _ => {
                let count = PacketReader::new(payload).read_lenenc_u64()?;
                let expected = usize::try_from(count)
                    .map_err(|_| protocol_error_with_data("invalid column count", payload))?;
                if expected == 0 {
                    return Err(protocol_error_with_data("invalid column count", payload));
                }
                trace!(columns = expected, "result set header");
                self.out_params = false;
                self.state = ExchangeState::ReadingColumns {
                    expected,
                    columns: Vec::with_capacity(expected.min(4096)),
                };
                Ok(Step::Await)
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn read_ok(&mut self, payload: &[u8], info: &mut ConnectionInfo) -> Result<Step> {
        let mut reader = PacketReader::new(payload);
        reader.skip(1)?;
        let affected_rows = reader.read_lenenc_u64()?;
        let insert_id = reader
            .read_signed_lenenc()?
            .ok_or_else(|| protocol_error_with_data("NULL insert id in OK packet", payload))?;
        let status = reader.read_u16_le()?;
        let warning_status = reader.read_u16_le()?;
        info.status = status;

        let message = if info.capabilities & capabilities::CLIENT_SESSION_TRACK != 0 {
            let message = if reader.is_empty() {
                String::new()
            } else {
                reader.read_lenenc_string(info.charset)?.unwrap_or_default()
            };
            if status & SERVER_SESSION_STATE_CHANGED != 0 {
                let changes = session::track_session_state(&mut reader, info)?;
                self.changes.extend(changes);
            }
            message
        } else {
            reader.read_string_remaining(info.charset)
        };

        debug!(
            affected_rows,
            insert_id,
            status,
            warnings = warning_status,
            "OK packet"
        );
        self.responses.push(Response::Change(ChangeResult {
            affected_rows,
            insert_id,
            warning_status,
            info: message,
            out_params: status & SERVER_PS_OUT_PARAMS != 0,
        }));

        if status & SERVER_MORE_RESULTS_EXISTS != 0 {
            self.state = ExchangeState::AwaitingResponse;
            return Ok(Step::Await);
        }
        Ok(self.resolve(None))
    }

    #[allow(clippy::result_large_err)]
    fn read_error(&mut self, payload: &[u8], info: &mut ConnectionInfo) -> Result<Step> {
        let err = PacketReader::new(payload).read_error(info.charset)?;
        // ERR packets carry no status; assume a transaction may be open.
        info.status |= SERVER_STATUS_IN_TRANS;
        debug!(
            code = err.error_code,
            sqlstate = %err.sql_state,
            message = %err.error_message,
            "ERR packet"
        );
        Ok(self.resolve(Some(query_error(&err))))
    }

    #[allow(clippy::result_large_err)]
    fn read_intermediate_eof(&mut self, payload: &[u8], info: &mut ConnectionInfo) -> Result<()> {
        if payload.first() != Some(&header::EOF) {
            return Err(protocol_error_with_data(
                "Error in protocol, expected EOF packet",
                payload,
            ));
        }
        let mut reader = PacketReader::new(payload);
        reader.skip(3)?;
        let status = reader.read_u16_le()?;
        info.status = status;
        self.out_params = status & SERVER_PS_OUT_PARAMS != 0;
        Ok(())
    }

    fn start_rows(&mut self, columns: Vec<ColumnDef>) {
        let header = RowHeader::build(&self.shape, &columns);
        trace!(columns = columns.len(), "column definitions read");
        self.state = ExchangeState::ReadingRows {
            columns: columns.into(),
            header,
            rows: Vec::new(),
        };
    }

    fn resolve(&mut self, server_error: Option<Error>) -> Step {
        self.state = ExchangeState::Finished;
        let responses = std::mem::take(&mut self.responses);
        match (self.pending_error.take(), server_error) {
            (Some(err), _) | (None, Some(err)) => Step::Done(Err(err)),
            (None, None) => Step::Done(Ok(QueryResult::from_responses(responses))),
        }
    }
}

/// Does this row-phase packet end the result set?
fn is_rows_terminator(payload: &[u8], eof_deprecated: bool) -> bool {
    payload.first() == Some(&header::EOF)
        && if eof_deprecated {
            payload.len() < MAX_PACKET_SIZE
        } else {
            payload.len() < LEGACY_EOF_MAX_LEN
        }
}

/// Status flags of a rows terminator: a legacy EOF packet, or an OK packet
/// with the 0xFE header when EOF is deprecated.
#[allow(clippy::result_large_err)]
fn read_terminator_status(payload: &[u8], eof_deprecated: bool) -> Result<u16> {
    let mut reader = PacketReader::new(payload);
    if eof_deprecated {
        reader.skip(1)?;
        reader.skip_lenenc()?;
        reader.skip_lenenc()?;
    } else {
        reader.skip(3)?;
    }
    reader.read_u16_le()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command::session::tests::{lenenc_bytes, session_block, variable};
    use crate::protocol::capabilities::{CLIENT_DEPRECATE_EOF, DEFAULT_CLIENT_FLAGS};
    use crate::protocol::server_status::SERVER_STATUS_AUTOCOMMIT;
    use crate::protocol::{Charset, session_track};
    use crate::types::tests::column_def_payload;
    use crate::types::{FieldType, TextValueDecoder, column_flags};
    use sqlwire_core::Value;
    use sqlwire_core::error::QueryErrorKind;

    pub(crate) fn ok_payload(affected: u8, insert_id: u8, status: u16) -> Vec<u8> {
        let mut p = vec![0x00, affected, insert_id];
        p.extend_from_slice(&status.to_le_bytes());
        p.extend_from_slice(&[0, 0]);
        p
    }

    pub(crate) fn legacy_eof(status: u16) -> Vec<u8> {
        let mut p = vec![0xFE, 0, 0];
        p.extend_from_slice(&status.to_le_bytes());
        p
    }

    pub(crate) fn ok_terminator(status: u16) -> Vec<u8> {
        let mut p = vec![0xFE, 0, 0];
        p.extend_from_slice(&status.to_le_bytes());
        p.extend_from_slice(&[0, 0]);
        p
    }

    pub(crate) fn text_row(fields: &[Option<&str>]) -> Vec<u8> {
        let mut p = Vec::new();
        for field in fields {
            match field {
                Some(s) => p.extend(lenenc_bytes(s.as_bytes())),
                None => p.push(0xFB),
            }
        }
        p
    }

    fn err_payload(code: u16, state: &str, msg: &str) -> Vec<u8> {
        let mut p = vec![0xFF];
        p.extend_from_slice(&code.to_le_bytes());
        p.push(b'#');
        p.extend_from_slice(state.as_bytes());
        p.extend_from_slice(msg.as_bytes());
        p
    }

    fn exchange(shape: RowShape) -> CommandExchange {
        CommandExchange::new(shape, Arc::new(TextValueDecoder))
    }

    fn legacy_info() -> ConnectionInfo {
        ConnectionInfo::new(1, DEFAULT_CLIENT_FLAGS & !CLIENT_DEPRECATE_EOF)
    }

    /// Feed packets until the exchange resolves.
    fn run(
        ex: &mut CommandExchange,
        info: &mut ConnectionInfo,
        packets: &[Vec<u8>],
    ) -> Result<QueryResult> {
        for (i, packet) in packets.iter().enumerate() {
            match ex.on_packet(packet, info)? {
                Step::Done(result) => {
                    assert_eq!(i, packets.len() - 1, "resolved before last packet");
                    return result;
                }
                Step::Await => {}
                Step::LocalInfile(f) => panic!("unexpected infile request {f}"),
            }
        }
        panic!("exchange did not resolve");
    }

    fn result_set_packets(eof_deprecated: bool, final_status: u16) -> Vec<Vec<u8>> {
        let mut packets = vec![
            vec![0x02],
            column_def_payload("t", "id", FieldType::Long, column_flags::NOT_NULL),
            column_def_payload("t", "name", FieldType::VarString, 0),
        ];
        if !eof_deprecated {
            packets.push(legacy_eof(SERVER_STATUS_AUTOCOMMIT));
        }
        packets.push(text_row(&[Some("1"), Some("a")]));
        packets.push(text_row(&[Some("2"), None]));
        packets.push(if eof_deprecated {
            ok_terminator(final_status)
        } else {
            legacy_eof(final_status)
        });
        packets
    }

    #[test]
    fn test_ok_response() {
        let mut info = ConnectionInfo::default();
        let mut ex = exchange(RowShape::Flat);
        let result = run(&mut ex, &mut info, &[ok_payload(3, 7, SERVER_STATUS_AUTOCOMMIT)]).unwrap();
        let change = result.first_change().unwrap();
        assert_eq!(change.affected_rows, 3);
        assert_eq!(change.insert_id, 7);
        assert!(matches!(result, QueryResult::Single(_)));
        assert!(ex.is_finished());
    }

    #[test]
    fn test_ok_info_without_session_tracking() {
        let mut info = ConnectionInfo::new(1, DEFAULT_CLIENT_FLAGS & !capabilities::CLIENT_SESSION_TRACK);
        let mut payload = ok_payload(1, 0, SERVER_STATUS_AUTOCOMMIT);
        payload.extend_from_slice(b"Rows matched: 1  Changed: 1  Warnings: 0");
        let result = run(&mut exchange(RowShape::Flat), &mut info, &[payload]).unwrap();
        assert_eq!(
            result.first_change().unwrap().info,
            "Rows matched: 1  Changed: 1  Warnings: 0"
        );
    }

    #[test]
    fn test_ok_with_session_state() {
        let mut info = ConnectionInfo::default();
        let mut payload = ok_payload(0, 0, SERVER_STATUS_AUTOCOMMIT | SERVER_SESSION_STATE_CHANGED);
        payload.extend(lenenc_bytes(b""));
        payload.extend(session_block(&[
            (session_track::SCHEMA, lenenc_bytes(b"shop")),
            (session_track::SYSTEM_VARIABLES, variable("character_set_client", "latin1")),
        ]));
        let mut ex = exchange(RowShape::Flat);
        run(&mut ex, &mut info, &[payload]).unwrap();
        assert_eq!(info.database.as_deref(), Some("shop"));
        assert_eq!(info.charset, Charset::Latin1);
        assert_eq!(ex.session_changes().len(), 2);
    }

    #[test]
    fn test_err_response_forces_transaction_flag() {
        let mut info = ConnectionInfo::default();
        assert!(!info.in_transaction());
        let err = run(
            &mut exchange(RowShape::Flat),
            &mut info,
            &[err_payload(1146, "42S02", "Table 'test.nope' doesn't exist")],
        )
        .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.code(), Some(1146));
        assert_eq!(err.sqlstate(), Some("42S02"));
        assert!(matches!(&err, Error::Query(q) if q.kind == QueryErrorKind::NotFound));
        assert!(info.in_transaction());
    }

    #[test]
    fn test_result_set_legacy_and_deprecated_eof_agree() {
        let mut legacy = legacy_info();
        let legacy_result = run(
            &mut exchange(RowShape::Flat),
            &mut legacy,
            &result_set_packets(false, SERVER_STATUS_AUTOCOMMIT),
        )
        .unwrap();

        let mut modern = ConnectionInfo::default();
        let modern_result = run(
            &mut exchange(RowShape::Flat),
            &mut modern,
            &result_set_packets(true, SERVER_STATUS_AUTOCOMMIT),
        )
        .unwrap();

        assert_eq!(legacy_result, modern_result);
        let rows = legacy_result.first_rows().unwrap();
        assert_eq!(rows.column_names(), vec!["id", "name"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows.rows[0].get("name"), Some(&Value::Text("a".into())));
        assert_eq!(rows.rows[1].get("name"), Some(&Value::Null));
        assert!(!rows.out_params);
    }

    #[test]
    fn test_missing_legacy_eof_is_fatal() {
        let mut info = legacy_info();
        let mut ex = exchange(RowShape::Flat);
        ex.on_packet(&[0x01], &mut info).unwrap();
        ex.on_packet(&column_def_payload("t", "id", FieldType::Long, 0), &mut info)
            .unwrap();
        let err = ex
            .on_packet(&text_row(&[Some("1")]), &mut info)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Error in protocol, expected EOF packet"));
        assert!(ex.is_finished());
    }

    #[test]
    fn test_row_starting_with_fe_is_not_a_terminator() {
        // A 0xFE-led row of 13+ bytes on a legacy connection is data.
        let long = "x".repeat(20);
        let mut row = vec![0xFE];
        row.extend_from_slice(&(long.len() as u64).to_le_bytes());
        row.extend_from_slice(long.as_bytes());
        assert!(!is_rows_terminator(&row, false));
        assert!(is_rows_terminator(&legacy_eof(0), false));
        assert!(is_rows_terminator(&ok_terminator(0), true));
    }

    #[test]
    fn test_multi_result_chain() {
        let mut info = ConnectionInfo::default();
        let more = SERVER_STATUS_AUTOCOMMIT | SERVER_MORE_RESULTS_EXISTS;
        let mut packets = result_set_packets(true, more);
        packets.push(ok_payload(1, 0, more));
        packets.extend(result_set_packets(true, SERVER_STATUS_AUTOCOMMIT));

        let result = run(&mut exchange(RowShape::Array), &mut info, &packets).unwrap();
        let responses = result.responses();
        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], Response::Rows(_)));
        assert_eq!(responses[1].as_change().unwrap().affected_rows, 1);
        assert_eq!(
            responses[2].as_rows().unwrap().rows[0],
            DecodedRow::Array(vec![Value::Int(1), Value::Text("a".into())])
        );
        assert!(!info.more_results());
    }

    #[test]
    fn test_out_params_chain_to_final_ok() {
        let mut info = legacy_info();
        let mut packets = vec![
            vec![0x01],
            column_def_payload("", "@total", FieldType::LongLong, 0),
            legacy_eof(SERVER_STATUS_AUTOCOMMIT | SERVER_PS_OUT_PARAMS),
            text_row(&[Some("42")]),
            legacy_eof(SERVER_STATUS_AUTOCOMMIT),
        ];
        packets.push(ok_payload(0, 0, SERVER_STATUS_AUTOCOMMIT));

        let result = run(&mut exchange(RowShape::Flat), &mut info, &packets).unwrap();
        let responses = result.responses();
        assert_eq!(responses.len(), 2);
        let out = responses[0].as_rows().unwrap();
        assert!(out.out_params);
        assert_eq!(out.rows[0].get("@total"), Some(&Value::BigInt(42)));
        assert!(responses[1].as_change().is_some());
    }

    #[test]
    fn test_err_inside_rows_fails_command() {
        let mut info = ConnectionInfo::default();
        let mut packets = result_set_packets(true, 0);
        packets.truncate(4);
        packets.push(err_payload(1317, "70100", "Query execution was interrupted"));
        let err = run(&mut exchange(RowShape::Flat), &mut info, &packets).unwrap_err();
        assert_eq!(err.code(), Some(1317));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_local_infile_request_and_pending_error() {
        let mut info = ConnectionInfo::default();
        let mut ex = exchange(RowShape::Flat);
        let mut request = vec![0xFB];
        request.extend_from_slice(b"/tmp/data.csv");
        match ex.on_packet(&request, &mut info).unwrap() {
            Step::LocalInfile(file) => assert_eq!(file, "/tmp/data.csv"),
            other => panic!("unexpected step {other:?}"),
        }

        ex.fail_after_response(crate::error::local_infile_error(
            crate::error::client_code::ER_LOCAL_INFILE_DISABLED,
            "LOCAL INFILE command failed: disabled",
        ));
        // The server's own error is superseded by the client-side failure.
        let step = ex
            .on_packet(&err_payload(1148, "42000", "not allowed"), &mut info)
            .unwrap();
        match step {
            Step::Done(Err(err)) => {
                assert_eq!(
                    err.code(),
                    Some(crate::error::client_code::ER_LOCAL_INFILE_DISABLED)
                );
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_packet_after_completion_is_fatal() {
        let mut info = ConnectionInfo::default();
        let mut ex = exchange(RowShape::Flat);
        ex.on_packet(&ok_payload(0, 0, 0), &mut info).unwrap();
        let err = ex.on_packet(&ok_payload(0, 0, 0), &mut info).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_ok_is_fatal() {
        let mut info = ConnectionInfo::default();
        let err = exchange(RowShape::Flat)
            .on_packet(&[0x00, 0x01], &mut info)
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
