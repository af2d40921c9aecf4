//! MySQL packet reading utilities.
//!
//! A `PacketReader` is a bounds-checked cursor over one reassembled packet
//! payload. Every read past the end of the payload is a protocol error.

#![allow(clippy::cast_possible_truncation)]

use sqlwire_core::{Error, Result};

use crate::error::protocol_error;
use crate::protocol::charset::Charset;
use crate::protocol::{ErrPacket, lenenc};

/// A reader for MySQL protocol data.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

fn truncated(needed: usize, remaining: usize) -> Error {
    protocol_error(format!(
        "packet truncated: needed {} bytes, {} remaining",
        needed, remaining
    ))
}

impl<'a> PacketReader<'a> {
    /// Create a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get remaining bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if we've reached the end of the data.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Peek at the next byte without advancing.
    #[allow(clippy::result_large_err)]
    pub fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| truncated(1, 0))
    }

    /// Read a fixed number of bytes.
    #[allow(clippy::result_large_err)]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(truncated(len, self.remaining()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    #[allow(clippy::result_large_err)]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte.
    #[allow(clippy::result_large_err)]
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a u16 (little-endian).
    #[allow(clippy::result_large_err)]
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a u24 (little-endian, 3 bytes).
    #[allow(clippy::result_large_err)]
    pub fn read_u24_le(&mut self) -> Result<u32> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from(a) | (u32::from(b) << 8) | (u32::from(c) << 16))
    }

    /// Read a u32 (little-endian).
    #[allow(clippy::result_large_err)]
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a u64 (little-endian).
    #[allow(clippy::result_large_err)]
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read a length-encoded integer.
    ///
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFB: NULL, returned as `None`
    /// - 0xFC: 2-byte value follows
    /// - 0xFD: 3-byte value follows
    /// - 0xFE: 8-byte value follows
    /// - 0xFF: reserved for error packets, rejected
    #[allow(clippy::result_large_err)]
    pub fn read_lenenc_int(&mut self) -> Result<Option<u64>> {
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Ok(Some(u64::from(first))),
            lenenc::NULL => Ok(None),
            lenenc::U16 => self.read_u16_le().map(|v| Some(u64::from(v))),
            lenenc::U24 => self.read_u24_le().map(|v| Some(u64::from(v))),
            lenenc::U64 => self.read_u64_le().map(Some),
            lenenc::RESERVED => Err(protocol_error(
                "unexpected 0xFF marker in length-encoded integer",
            )),
        }
    }

    /// Read a length-encoded integer, treating NULL as an error.
    #[allow(clippy::result_large_err)]
    pub fn read_lenenc_u64(&mut self) -> Result<u64> {
        self.read_lenenc_int()?
            .ok_or_else(|| protocol_error("unexpected NULL length-encoded integer"))
    }

    /// Read a signed length-encoded integer (two's complement of the
    /// unsigned encoding).
    #[allow(clippy::result_large_err)]
    pub fn read_signed_lenenc(&mut self) -> Result<Option<i64>> {
        Ok(self.read_lenenc_int()?.map(|v| v as i64))
    }

    /// Skip over a length-encoded integer.
    #[allow(clippy::result_large_err)]
    pub fn skip_lenenc(&mut self) -> Result<()> {
        self.read_lenenc_int().map(|_| ())
    }

    /// Read a length-encoded byte slice (`None` for NULL).
    #[allow(clippy::result_large_err)]
    pub fn read_lenenc_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        match self.read_lenenc_int()? {
            Some(len) => {
                let len = usize::try_from(len).map_err(|_| truncated(usize::MAX, self.remaining()))?;
                self.read_bytes(len).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Read a length-encoded string in the given charset (`None` for NULL).
    #[allow(clippy::result_large_err)]
    pub fn read_lenenc_string(&mut self, charset: Charset) -> Result<Option<String>> {
        Ok(self.read_lenenc_bytes()?.map(|b| charset.decode(b)))
    }

    /// Slice out a length-prefixed nested region as its own reader.
    ///
    /// The sub-reader can never see past its declared length; the parent
    /// cursor moves past the whole region.
    #[allow(clippy::result_large_err)]
    pub fn sub_packet_lenenc(&mut self) -> Result<PacketReader<'a>> {
        let bytes = self.read_lenenc_bytes()?.unwrap_or_default();
        Ok(PacketReader::new(bytes))
    }

    /// Skip a number of bytes.
    #[allow(clippy::result_large_err)]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Read remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    /// Read remaining data as a string.
    pub fn read_string_remaining(&mut self, charset: Charset) -> String {
        charset.decode(self.read_rest())
    }

    /// Parse an ERR packet from the current position.
    ///
    /// ERR packet format (protocol 4.1+):
    /// - 0xFF header (skipped if still present)
    /// - error_code: 2 bytes
    /// - '#' marker
    /// - sql_state: 5 bytes
    /// - error_message: rest of packet
    #[allow(clippy::result_large_err)]
    pub fn read_error(&mut self, charset: Charset) -> Result<ErrPacket> {
        if self.peek()? == 0xFF {
            self.pos += 1;
        }

        let error_code = self.read_u16_le()?;

        let sql_state = if self.remaining() > 0 && self.peek()? == b'#' {
            self.pos += 1;
            String::from_utf8_lossy(self.read_bytes(5)?).into_owned()
        } else {
            String::new()
        };

        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message: self.read_string_remaining(charset),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let data = [
            0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04,
            0x05, 0x06, 0x07, 0x08,
        ];
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.read_u24_le().unwrap(), 0x0012_3456);
        assert_eq!(reader.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_u64_le().unwrap(), 0x0807_0605_0403_0201);
        assert!(reader.is_empty());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_read_lenenc_int() {
        let mut reader = PacketReader::new(&[0x42]);
        assert_eq!(reader.read_lenenc_int().unwrap(), Some(0x42));

        let mut reader = PacketReader::new(&[0xFC, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int().unwrap(), Some(0x1234));

        let mut reader = PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int().unwrap(), Some(0x0012_3456));

        let mut reader = PacketReader::new(&[0xFE, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(reader.read_lenenc_int().unwrap(), Some(0x0807_0605_0403_0201));

        let mut reader = PacketReader::new(&[0xFB]);
        assert_eq!(reader.read_lenenc_int().unwrap(), None);

        let mut reader = PacketReader::new(&[0xFF]);
        assert!(reader.read_lenenc_int().is_err());

        // Truncated 2-byte value
        let mut reader = PacketReader::new(&[0xFC, 0x34]);
        assert!(reader.read_lenenc_int().is_err());
    }

    #[test]
    fn test_signed_lenenc() {
        let mut reader = PacketReader::new(&[0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(reader.read_signed_lenenc().unwrap(), Some(-1));
    }

    #[test]
    fn test_read_lenenc_string() {
        let mut reader = PacketReader::new(&[0x05, b'h', b'e', b'l', b'l', b'o', 0xFB]);
        assert_eq!(
            reader.read_lenenc_string(Charset::Utf8mb4).unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(reader.read_lenenc_string(Charset::Utf8mb4).unwrap(), None);

        // Declared length longer than the payload
        let mut reader = PacketReader::new(&[0x05, b'h']);
        assert!(reader.read_lenenc_string(Charset::Utf8mb4).is_err());
    }

    #[test]
    fn test_sub_packet_is_bounded() {
        let data = [0x02, 0xAA, 0xBB, 0xCC];
        let mut reader = PacketReader::new(&data);
        let mut sub = reader.sub_packet_lenenc().unwrap();
        assert_eq!(sub.remaining(), 2);
        assert_eq!(sub.read_u16_le().unwrap(), 0xBBAA);
        assert!(sub.read_u8().is_err());
        assert_eq!(reader.read_u8().unwrap(), 0xCC);
    }

    #[test]
    fn test_skip_and_remaining() {
        let mut reader = PacketReader::new(&[1, 2, 3, 0xFC, 0x00, 0x01, 9]);
        reader.skip(3).unwrap();
        reader.skip_lenenc().unwrap();
        assert_eq!(reader.remaining(), 1);
        assert!(reader.skip(2).is_err());
        assert_eq!(reader.read_string_remaining(Charset::Utf8mb4), "\u{9}");
    }

    #[test]
    fn test_read_error() {
        let mut data = vec![0xFF, 0x15, 0x04, b'#'];
        data.extend_from_slice(b"28000");
        data.extend_from_slice(b"Access denied");
        let mut reader = PacketReader::new(&data);
        let err = reader.read_error(Charset::Utf8mb4).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.error_message, "Access denied");
    }
}
