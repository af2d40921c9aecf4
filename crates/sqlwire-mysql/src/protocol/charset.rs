//! Connection character sets.
//!
//! Only the encodings needed to put text on the wire are modelled here;
//! collation tables stay with the server.

use std::borrow::Cow;

pub const LATIN1_SWEDISH_CI: u8 = 8;
pub const ASCII_GENERAL_CI: u8 = 11;
pub const UTF8_GENERAL_CI: u8 = 33;
pub const UTF8MB4_GENERAL_CI: u8 = 45;
pub const UTF8MB4_BIN: u8 = 46;
pub const BINARY: u8 = 63;
pub const UTF8_BIN: u8 = 83;
pub const UTF8MB4_UNICODE_CI: u8 = 224;
pub const UTF8MB4_0900_AI_CI: u8 = 255;

/// Character set used to encode outgoing text and decode incoming text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// 4-byte UTF-8 (default)
    #[default]
    Utf8mb4,
    /// 3-byte UTF-8 (`utf8`, `utf8mb3`)
    Utf8,
    /// ISO-8859-1
    Latin1,
    /// 7-bit ASCII
    Ascii,
    /// Raw bytes, decoded lossily as UTF-8
    Binary,
}

impl Charset {
    /// Look up a charset by the name the server reports (e.g. in
    /// `character_set_client`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "utf8mb4" => Some(Charset::Utf8mb4),
            "utf8" | "utf8mb3" => Some(Charset::Utf8),
            "latin1" => Some(Charset::Latin1),
            "ascii" => Some(Charset::Ascii),
            "binary" => Some(Charset::Binary),
            _ => None,
        }
    }

    /// Map a collation id (as found in column definitions) to its charset.
    pub fn from_collation_id(id: u16) -> Option<Self> {
        let id = u8::try_from(id).ok()?;
        match id {
            LATIN1_SWEDISH_CI => Some(Charset::Latin1),
            ASCII_GENERAL_CI => Some(Charset::Ascii),
            UTF8_GENERAL_CI | UTF8_BIN => Some(Charset::Utf8),
            UTF8MB4_GENERAL_CI | UTF8MB4_BIN | UTF8MB4_UNICODE_CI | UTF8MB4_0900_AI_CI => {
                Some(Charset::Utf8mb4)
            }
            BINARY => Some(Charset::Binary),
            _ => None,
        }
    }

    /// Default collation id for this charset.
    pub const fn collation_id(self) -> u8 {
        match self {
            Charset::Utf8mb4 => UTF8MB4_0900_AI_CI,
            Charset::Utf8 => UTF8_GENERAL_CI,
            Charset::Latin1 => LATIN1_SWEDISH_CI,
            Charset::Ascii => ASCII_GENERAL_CI,
            Charset::Binary => BINARY,
        }
    }

    /// Charset name as used by the server.
    pub const fn name(self) -> &'static str {
        match self {
            Charset::Utf8mb4 => "utf8mb4",
            Charset::Utf8 => "utf8",
            Charset::Latin1 => "latin1",
            Charset::Ascii => "ascii",
            Charset::Binary => "binary",
        }
    }

    /// Encode text for the wire. Unrepresentable characters become `?`.
    pub fn encode(self, s: &str) -> Cow<'_, [u8]> {
        match self {
            Charset::Utf8mb4 | Charset::Utf8 | Charset::Binary => Cow::Borrowed(s.as_bytes()),
            Charset::Ascii if s.is_ascii() => Cow::Borrowed(s.as_bytes()),
            Charset::Latin1 if s.is_ascii() => Cow::Borrowed(s.as_bytes()),
            Charset::Ascii => Cow::Owned(
                s.chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .collect(),
            ),
            Charset::Latin1 => Cow::Owned(
                s.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    /// Decode text received from the wire.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_and_collation() {
        assert_eq!(Charset::from_name("UTF8MB4"), Some(Charset::Utf8mb4));
        assert_eq!(Charset::from_name("utf8mb3"), Some(Charset::Utf8));
        assert_eq!(Charset::from_name("koi8r"), None);
        assert_eq!(Charset::from_collation_id(8), Some(Charset::Latin1));
        assert_eq!(Charset::from_collation_id(224), Some(Charset::Utf8mb4));
        assert_eq!(Charset::from_collation_id(300), None);
    }

    #[test]
    fn test_latin1_encoding() {
        let encoded = Charset::Latin1.encode("caf\u{e9}\u{263a}");
        assert_eq!(&*encoded, &[b'c', b'a', b'f', 0xE9, b'?']);
        assert_eq!(Charset::Latin1.decode(&[b'c', 0xE9]), "c\u{e9}");
        assert!(matches!(Charset::Utf8mb4.encode("abc"), Cow::Borrowed(_)));
    }
}
