//! MySQL packet writing utilities.
//!
//! `PacketWriter` builds outgoing commands directly into a framed buffer:
//! the first 4 bytes are reserved for the packet header, payload bytes
//! follow. The buffer grows in tiers up to one full packet; beyond that the
//! writer flushes full packets and keeps going, so a payload of any size is
//! split into consecutive packets with consecutive sequence numbers.
//!
//! Flushed packets are copied into an outbox which the connection drains to
//! the transport.

#![allow(clippy::cast_possible_truncation)]

use chrono::{DateTime, FixedOffset, Local, Utc};
use tracing::trace;

use crate::config::TimeZone;
use crate::protocol::charset::Charset;
use crate::protocol::{MAX_PACKET_SIZE, PacketHeader, lenenc};

pub const SMALL_BUFFER_SIZE: usize = 2048;
pub const MEDIUM_BUFFER_SIZE: usize = 128 * 1024;
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;
/// One maximum-size packet including its header.
pub const MAX_BUFFER_SIZE: usize = MAX_PACKET_SIZE + PacketHeader::SIZE;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const QUOTE: u8 = b'\'';
const DBL_QUOTE: u8 = b'"';
const ZERO_BYTE: u8 = 0x00;
const SLASH: u8 = b'\\';

#[inline]
fn needs_escape(b: u8) -> bool {
    matches!(b, QUOTE | DBL_QUOTE | ZERO_BYTE | SLASH)
}

/// A framing writer for MySQL commands.
#[derive(Debug)]
pub struct PacketWriter {
    buf: Vec<u8>,
    pos: usize,
    sequence: u8,
    charset: Charset,
    outbox: Vec<Vec<u8>>,
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new(Charset::default())
    }
}

impl PacketWriter {
    /// Create a new writer with the small default buffer.
    pub fn new(charset: Charset) -> Self {
        Self {
            buf: vec![0; SMALL_BUFFER_SIZE],
            pos: PacketHeader::SIZE,
            sequence: 0,
            charset,
            outbox: Vec::new(),
        }
    }

    /// Begin a new packet sequence. Resets the cursor to just past the
    /// header placeholder.
    pub fn start_packet(&mut self, sequence: u8) {
        self.sequence = sequence;
        self.pos = PacketHeader::SIZE;
    }

    /// Sequence number the next flushed packet will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Charset used by the string writers.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Switch the charset used for subsequent string writes.
    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// Current buffer capacity (one of the size tiers).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of payload bytes written but not yet flushed.
    pub fn pending(&self) -> usize {
        self.pos - PacketHeader::SIZE
    }

    /// No payload bytes waiting to be flushed.
    pub fn is_empty(&self) -> bool {
        self.pos == PacketHeader::SIZE
    }

    /// Take all framed packets flushed so far.
    pub fn take_frames(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Grow to the tier able to hold `len` more bytes, keeping everything
    /// written up to the cursor.
    fn grow(&mut self, len: usize) {
        let wanted = len + self.pos;
        let new_capacity = if wanted < MEDIUM_BUFFER_SIZE {
            MEDIUM_BUFFER_SIZE
        } else if wanted < LARGE_BUFFER_SIZE {
            LARGE_BUFFER_SIZE
        } else {
            MAX_BUFFER_SIZE
        };
        if new_capacity <= self.buf.len() {
            return;
        }
        let mut new_buf = vec![0; new_capacity];
        new_buf[..self.pos].copy_from_slice(&self.buf[..self.pos]);
        self.buf = new_buf;
    }

    /// Make room for `len` bytes if the tiers allow it. Returns whether
    /// they now fit without flushing.
    fn reserve(&mut self, len: usize) -> bool {
        if len > self.buf.len() - self.pos && self.buf.len() < MAX_BUFFER_SIZE {
            self.grow(len);
        }
        len <= self.buf.len() - self.pos
    }

    #[inline]
    fn push_byte(&mut self, b: u8) {
        if self.pos == self.buf.len() {
            if self.buf.len() < MAX_BUFFER_SIZE {
                self.grow(1);
            } else {
                self.flush_buffer(false);
            }
        }
        self.buf[self.pos] = b;
        self.pos += 1;
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.push_byte(value);
    }

    /// Write a u16 (little-endian).
    pub fn write_u16_le(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a u24 (little-endian, 3 bytes).
    pub fn write_u24_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes()[..3]);
    }

    /// Write a u32 (little-endian).
    pub fn write_u32_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    pub fn write_u64_le(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a length-encoded integer.
    ///
    /// - below 0xFB: 1-byte value
    /// - below 0xFFFF: 0xFC + 2 bytes
    /// - below 0xFFFFFF: 0xFD + 3 bytes
    /// - otherwise: 0xFE + 8 bytes
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 0xFB {
            self.write_u8(value as u8);
        } else if value < 0xFFFF {
            self.write_u8(lenenc::U16);
            self.write_u16_le(value as u16);
        } else if value < 0xFF_FFFF {
            self.write_u8(lenenc::U24);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(lenenc::U64);
            self.write_u64_le(value);
        }
    }

    /// Write the length-encoded NULL marker.
    pub fn write_lenenc_null(&mut self) {
        self.write_u8(lenenc::NULL);
    }

    /// Write raw bytes, flushing full packets as needed.
    pub fn write_bytes(&mut self, mut data: &[u8]) {
        if self.reserve(data.len()) {
            self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            return;
        }

        // Larger than one packet: fill, flush, repeat.
        loop {
            let chunk = (MAX_BUFFER_SIZE - self.pos).min(data.len());
            self.buf[self.pos..self.pos + chunk].copy_from_slice(&data[..chunk]);
            self.pos += chunk;
            data = &data[chunk..];
            if data.is_empty() {
                break;
            }
            self.flush_buffer(false);
        }
    }

    /// Write raw bytes, escaping `\0`, `'`, `"` and `\` with a backslash.
    pub fn write_bytes_escaped(&mut self, data: &[u8]) {
        if self.reserve(data.len() * 2) {
            for &b in data {
                if needs_escape(b) {
                    self.buf[self.pos] = SLASH;
                    self.pos += 1;
                }
                self.buf[self.pos] = b;
                self.pos += 1;
            }
            return;
        }

        for &b in data {
            if needs_escape(b) {
                self.push_byte(SLASH);
            }
            self.push_byte(b);
        }
    }

    /// Write a string in the connection charset.
    pub fn write_str(&mut self, s: &str) {
        let encoded = self.charset.encode(s);
        self.write_bytes(&encoded);
    }

    /// Write an ASCII string (no charset conversion, no escaping).
    pub fn write_str_ascii(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Write a string in the connection charset with escaping.
    ///
    /// Every escaped character is below 0x80, so escaping the encoded bytes
    /// is safe for multi-byte charsets.
    pub fn write_str_escaped(&mut self, s: &str) {
        let encoded = self.charset.encode(s);
        self.write_bytes_escaped(&encoded);
    }

    /// Write a length-encoded string in the connection charset.
    pub fn write_lenenc_str(&mut self, s: &str) {
        let encoded = self.charset.encode(s);
        self.write_lenenc_int(encoded.len() as u64);
        self.write_bytes(&encoded);
    }

    /// Write a timestamp as `YYYY-MM-DD HH:MM:SS.mmm`.
    ///
    /// `Local` renders the local clock; `Utc` renders UTC; `Offset` shifts
    /// the instant by the fixed offset before rendering.
    pub fn write_date(&mut self, instant: &DateTime<Utc>, timezone: TimeZone) {
        let rendered = match timezone {
            TimeZone::Local => instant.with_timezone(&Local).format(DATE_FORMAT).to_string(),
            TimeZone::Utc => instant.format(DATE_FORMAT).to_string(),
            TimeZone::Offset(seconds) => match FixedOffset::east_opt(seconds) {
                Some(offset) => instant.with_timezone(&offset).format(DATE_FORMAT).to_string(),
                None => instant.format(DATE_FORMAT).to_string(),
            },
        };
        self.write_str_ascii(&rendered);
    }

    /// Frame the buffered payload and move it to the outbox.
    ///
    /// When `command_end` is set and the packet is exactly the maximum
    /// size, an empty packet follows so the server sees the end of the
    /// message; the buffer then drops back to the small tier.
    pub fn flush_buffer(&mut self, command_end: bool) {
        let header = PacketHeader {
            payload_length: (self.pos - PacketHeader::SIZE) as u32,
            sequence_id: self.sequence,
        };
        self.buf[..PacketHeader::SIZE].copy_from_slice(&header.to_bytes());
        self.sequence = self.sequence.wrapping_add(1);

        trace!(
            sequence = header.sequence_id,
            len = header.payload_length,
            "==> packet"
        );
        self.outbox.push(self.buf[..self.pos].to_vec());

        if command_end {
            if self.pos == MAX_BUFFER_SIZE {
                self.write_empty_packet();
            }
            if self.buf.len() != SMALL_BUFFER_SIZE {
                self.buf = vec![0; SMALL_BUFFER_SIZE];
            }
        }

        self.pos = PacketHeader::SIZE;
    }

    /// Emit a zero-length packet.
    pub fn write_empty_packet(&mut self) {
        let header = PacketHeader {
            payload_length: 0,
            sequence_id: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        trace!(sequence = header.sequence_id, len = 0, "==> empty packet");
        self.outbox.push(header.to_bytes().to_vec());
    }
}
