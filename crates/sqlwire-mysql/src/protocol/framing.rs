//! Inbound packet reassembly.
//!
//! Raw transport bytes are pushed in as they arrive; complete logical
//! packets come out. Consecutive maximum-size packets are concatenated into
//! one payload, terminated by the first shorter (possibly empty) packet.

use sqlwire_core::Result;
use tracing::trace;

use crate::error::protocol_error;
use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// One reassembled logical packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: Vec<u8>,
    /// Sequence number of the last physical packet making up this payload
    pub sequence_id: u8,
}

/// Groups transport bytes into logical packets and validates sequence
/// numbers.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    partial: Option<Vec<u8>>,
    expected: Option<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Require the next physical packet to carry `sequence`.
    pub fn expect_sequence(&mut self, sequence: u8) {
        self.expected = Some(sequence);
    }

    /// Sequence number expected for the next physical packet, i.e. the
    /// number the client continues with when it answers.
    pub fn next_sequence(&self) -> Option<u8> {
        self.expected
    }

    /// Bytes received but not yet returned as a complete packet.
    pub fn buffered(&self) -> usize {
        self.buf.len() + self.partial.as_ref().map_or(0, Vec::len)
    }

    /// Drop all buffered state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.partial = None;
        self.expected = None;
    }

    /// Return the next complete logical packet, if enough bytes arrived.
    #[allow(clippy::result_large_err)]
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            if self.buf.len() < PacketHeader::SIZE {
                return Ok(None);
            }
            let header =
                PacketHeader::from_bytes(&[self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            let len = header.payload_length as usize;
            if self.buf.len() < PacketHeader::SIZE + len {
                return Ok(None);
            }

            if let Some(expected) = self.expected {
                if header.sequence_id != expected {
                    return Err(protocol_error(format!(
                        "out of order packet: expected sequence {}, got {}",
                        expected, header.sequence_id
                    )));
                }
            }
            self.expected = Some(header.sequence_id.wrapping_add(1));

            trace!(sequence = header.sequence_id, len, "<== packet");

            let frame: Vec<u8> = self
                .buf
                .drain(..PacketHeader::SIZE + len)
                .skip(PacketHeader::SIZE)
                .collect();
            let payload = match self.partial.take() {
                Some(mut head) => {
                    head.extend_from_slice(&frame);
                    head
                }
                None => frame,
            };

            if len == MAX_PACKET_SIZE {
                self.partial = Some(payload);
                continue;
            }

            return Ok(Some(Packet {
                payload,
                sequence_id: header.sequence_id,
            }));
        }
    }
}
