//! Session state tracking carried by OK packets.
//!
//! With SERVER_SESSION_STATE_CHANGED set, the OK packet ends with a
//! length-encoded block of `{type, length-encoded payload}` entries. System
//! variable entries can switch the connection charset and schema entries
//! change the current database. Unknown entry types are skipped.

use sqlwire_core::Result;
use tracing::{debug, warn};

use crate::info::ConnectionInfo;
use crate::protocol::session_track;
use crate::protocol::{Charset, PacketReader};

/// A change applied to the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// `character_set_client` changed
    Charset(Charset),
    /// Current database changed
    Schema(String),
    /// Any other tracked system variable
    SystemVariable { name: String, value: String },
}

/// Consume the session state block and apply it to `info`.
#[allow(clippy::result_large_err)]
pub(crate) fn track_session_state(
    reader: &mut PacketReader<'_>,
    info: &mut ConnectionInfo,
) -> Result<Vec<SessionChange>> {
    let mut changes = Vec::new();

    while reader.remaining() > 0 {
        let mut block = reader.sub_packet_lenenc()?;
        while block.remaining() > 0 {
            let entry_type = block.read_u8()?;
            let mut entry = block.sub_packet_lenenc()?;
            match entry_type {
                session_track::SYSTEM_VARIABLES => {
                    let name = entry.read_lenenc_string(info.charset)?.unwrap_or_default();
                    let value = entry.read_lenenc_string(info.charset)?.unwrap_or_default();
                    if name == "character_set_client" {
                        match Charset::from_name(&value) {
                            Some(charset) => {
                                debug!(thread_id = info.thread_id, charset = charset.name(), "session charset changed");
                                info.charset = charset;
                                changes.push(SessionChange::Charset(charset));
                            }
                            None => {
                                warn!(thread_id = info.thread_id, charset = %value, "unsupported session charset, keeping current encoding");
                            }
                        }
                    } else {
                        changes.push(SessionChange::SystemVariable { name, value });
                    }
                }
                session_track::SCHEMA => {
                    let database = entry.read_lenenc_string(info.charset)?.unwrap_or_default();
                    debug!(thread_id = info.thread_id, database = %database, "session schema changed");
                    info.database = Some(database.clone());
                    changes.push(SessionChange::Schema(database));
                }
                other => {
                    debug!(entry_type = other, len = entry.remaining(), "skipping session track entry");
                }
            }
        }
    }

    Ok(changes)
}
