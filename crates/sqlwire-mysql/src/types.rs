//! MySQL column metadata and text-protocol value decoding.
//!
//! This module provides:
//! - MySQL field type codes and column flags
//! - Column definition packets parsed into `ColumnDef`
//! - The `ValueDecoder` seam used to turn raw field bytes into `Value`s,
//!   with `TextValueDecoder` as the default for the text protocol

#![allow(clippy::cast_possible_truncation)]

use sqlwire_core::{Result, Value};

use crate::error::protocol_error;
use crate::protocol::{Charset, PacketReader};

/// MySQL field type codes.
///
/// These are the `MYSQL_TYPE_*` constants from the MySQL C API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    /// DECIMAL (MYSQL_TYPE_DECIMAL)
    Decimal = 0x00,
    /// TINYINT (MYSQL_TYPE_TINY)
    Tiny = 0x01,
    /// SMALLINT (MYSQL_TYPE_SHORT)
    Short = 0x02,
    /// INT (MYSQL_TYPE_LONG)
    Long = 0x03,
    /// FLOAT (MYSQL_TYPE_FLOAT)
    Float = 0x04,
    /// DOUBLE (MYSQL_TYPE_DOUBLE)
    Double = 0x05,
    /// NULL (MYSQL_TYPE_NULL)
    Null = 0x06,
    /// TIMESTAMP (MYSQL_TYPE_TIMESTAMP)
    Timestamp = 0x07,
    /// BIGINT (MYSQL_TYPE_LONGLONG)
    LongLong = 0x08,
    /// MEDIUMINT (MYSQL_TYPE_INT24)
    Int24 = 0x09,
    /// DATE (MYSQL_TYPE_DATE)
    Date = 0x0A,
    /// TIME (MYSQL_TYPE_TIME)
    Time = 0x0B,
    /// DATETIME (MYSQL_TYPE_DATETIME)
    DateTime = 0x0C,
    /// YEAR (MYSQL_TYPE_YEAR)
    Year = 0x0D,
    /// NEWDATE (MYSQL_TYPE_NEWDATE)
    NewDate = 0x0E,
    /// VARCHAR (MYSQL_TYPE_VARCHAR)
    VarChar = 0x0F,
    /// BIT (MYSQL_TYPE_BIT)
    Bit = 0x10,
    /// JSON (MYSQL_TYPE_JSON)
    Json = 0xF5,
    /// NEWDECIMAL (MYSQL_TYPE_NEWDECIMAL)
    NewDecimal = 0xF6,
    /// ENUM (MYSQL_TYPE_ENUM)
    Enum = 0xF7,
    /// SET (MYSQL_TYPE_SET)
    Set = 0xF8,
    /// TINYBLOB (MYSQL_TYPE_TINY_BLOB)
    TinyBlob = 0xF9,
    /// MEDIUMBLOB (MYSQL_TYPE_MEDIUM_BLOB)
    MediumBlob = 0xFA,
    /// LONGBLOB (MYSQL_TYPE_LONG_BLOB)
    LongBlob = 0xFB,
    /// BLOB (MYSQL_TYPE_BLOB)
    Blob = 0xFC,
    /// VARCHAR (MYSQL_TYPE_VAR_STRING)
    VarString = 0xFD,
    /// CHAR (MYSQL_TYPE_STRING)
    String = 0xFE,
    /// GEOMETRY (MYSQL_TYPE_GEOMETRY)
    Geometry = 0xFF,
}

impl FieldType {
    /// Parse a field type from a byte. Unknown codes are treated as strings.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFF => FieldType::Geometry,
            _ => FieldType::String,
        }
    }

    /// Check if this is a BLOB-family type.
    #[must_use]
    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob
        )
    }

    /// Check if this is a character/binary string type.
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(
            self,
            FieldType::VarChar | FieldType::VarString | FieldType::String
        ) || self.is_blob()
    }
}

/// MySQL column flags.
#[allow(dead_code)]
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
}

/// Column definition from a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Schema (database) name
    pub schema: String,
    /// Table name (or alias)
    pub table: String,
    /// Original table name
    pub org_table: String,
    /// Column name (or alias)
    pub name: String,
    /// Original column name
    pub org_name: String,
    /// Collation id
    pub collation: u16,
    /// Column length
    pub column_length: u32,
    /// Column type
    pub column_type: FieldType,
    /// Column flags
    pub flags: u16,
    /// Number of decimals
    pub decimals: u8,
}

impl ColumnDef {
    /// Parse a column definition packet (protocol 4.1).
    #[allow(clippy::result_large_err)]
    pub fn parse(data: &[u8], charset: Charset) -> Result<Self> {
        let mut reader = PacketReader::new(data);
        let mut text = |field: &str| -> Result<String> {
            reader
                .read_lenenc_string(charset)?
                .ok_or_else(|| protocol_error(format!("column definition: NULL {}", field)))
        };

        // catalog is always "def"
        text("catalog")?;
        let schema = text("schema")?;
        let table = text("table")?;
        let org_table = text("org_table")?;
        let name = text("name")?;
        let org_name = text("org_name")?;

        // length of the fixed-size fields (0x0c)
        reader.skip_lenenc()?;
        let collation = reader.read_u16_le()?;
        let column_length = reader.read_u32_le()?;
        let column_type = FieldType::from_u8(reader.read_u8()?);
        let flags = reader.read_u16_le()?;
        let decimals = reader.read_u8()?;

        Ok(ColumnDef {
            schema,
            table,
            org_table,
            name,
            org_name,
            collation,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }

    /// Check if the column is unsigned.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Check if the column holds binary data.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.collation == crate::protocol::charset::BINARY as u16
    }

    /// Charset for decoding this column's text.
    pub fn charset(&self) -> Charset {
        Charset::from_collation_id(self.collation).unwrap_or_default()
    }
}

/// Decodes one raw field into a `Value`.
///
/// NULL fields never reach the decoder.
pub trait ValueDecoder: Send + Sync {
    fn decode(&self, column: &ColumnDef, data: &[u8]) -> Value;
}

/// Default decoder for text-protocol rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextValueDecoder;

impl ValueDecoder for TextValueDecoder {
    fn decode(&self, column: &ColumnDef, data: &[u8]) -> Value {
        if column.column_type.is_string() && column.is_binary() {
            return Value::Bytes(data.to_vec());
        }
        decode_text_value(column.column_type, data, column.is_unsigned(), column.charset())
    }
}

fn parse_or_text<T: std::str::FromStr>(text: &str, f: impl FnOnce(T) -> Value) -> Value {
    text.parse::<T>()
        .map_or_else(|_| Value::Text(text.to_string()), f)
}

/// Decode a text protocol value.
///
/// In text protocol, all values are transmitted as strings; the column
/// type decides how they are parsed. Unparseable numbers stay text.
pub fn decode_text_value(
    field_type: FieldType,
    data: &[u8],
    is_unsigned: bool,
    charset: Charset,
) -> Value {
    match field_type {
        FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::Geometry
        | FieldType::Bit => return Value::Bytes(data.to_vec()),
        FieldType::Null => return Value::Null,
        _ => {}
    }

    let text = charset.decode(data);
    match field_type {
        FieldType::Tiny if is_unsigned => parse_or_text::<u8>(&text, |v| Value::SmallInt(i16::from(v))),
        FieldType::Tiny => parse_or_text(&text, Value::TinyInt),
        FieldType::Short | FieldType::Year if is_unsigned => {
            parse_or_text::<u16>(&text, |v| Value::Int(i32::from(v)))
        }
        FieldType::Short | FieldType::Year => parse_or_text(&text, Value::SmallInt),
        FieldType::Long | FieldType::Int24 if is_unsigned => {
            parse_or_text::<u32>(&text, |v| Value::BigInt(i64::from(v)))
        }
        FieldType::Long | FieldType::Int24 => parse_or_text(&text, Value::Int),
        // Unsigned BIGINT beyond i64 stays exact as a decimal string
        FieldType::LongLong if is_unsigned => match text.parse::<i64>() {
            Ok(v) => Value::BigInt(v),
            Err(_) => Value::Decimal(text),
        },
        FieldType::LongLong => parse_or_text(&text, Value::BigInt),
        FieldType::Float => parse_or_text(&text, Value::Float),
        FieldType::Double => parse_or_text(&text, Value::Double),
        FieldType::Decimal | FieldType::NewDecimal => Value::Decimal(text),
        FieldType::Json => serde_json::from_str(&text).map_or(Value::Text(text), Value::Json),
        _ => Value::Text(text),
    }
}

/// Split a text-protocol row into per-column values.
///
/// Each field is a length-encoded string; 0xFB marks NULL. A row that ends
/// before every column is read is a protocol error.
#[allow(clippy::result_large_err)]
pub fn parse_text_row(
    data: &[u8],
    columns: &[ColumnDef],
    decoder: &dyn ValueDecoder,
) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(data);
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let value = match reader.read_lenenc_bytes()? {
            Some(bytes) => decoder.decode(column, bytes),
            None => Value::Null,
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::PacketWriter;

    /// Build a column definition payload.
    pub(crate) fn column_def_payload(table: &str, name: &str, field_type: FieldType, flags: u16) -> Vec<u8> {
        let mut w = PacketWriter::default();
        w.start_packet(0);
        for s in ["def", "testdb", table, table, name, name] {
            w.write_lenenc_str(s);
        }
        w.write_u8(0x0c);
        w.write_u16_le(u16::from(crate::protocol::charset::UTF8MB4_GENERAL_CI));
        w.write_u32_le(255);
        w.write_u8(field_type as u8);
        w.write_u16_le(flags);
        w.write_u8(0);
        w.write_u16_le(0);
        w.flush_buffer(true);
        w.take_frames().remove(0).split_off(4)
    }

    #[test]
    fn test_field_type_from_u8() {
        assert_eq!(FieldType::from_u8(0x01), FieldType::Tiny);
        assert_eq!(FieldType::from_u8(0xF5), FieldType::Json);
        assert_eq!(FieldType::from_u8(0x42), FieldType::String);
        assert!(FieldType::Blob.is_string());
    }

    #[test]
    fn test_parse_column_def() {
        let payload = column_def_payload("t1", "a", FieldType::LongLong, column_flags::UNSIGNED);
        let col = ColumnDef::parse(&payload, Charset::Utf8mb4).unwrap();
        assert_eq!(col.table, "t1");
        assert_eq!(col.name, "a");
        assert_eq!(col.schema, "testdb");
        assert_eq!(col.column_type, FieldType::LongLong);
        assert!(col.is_unsigned());
        assert_eq!(col.charset(), Charset::Utf8mb4);

        assert!(ColumnDef::parse(&payload[..10], Charset::Utf8mb4).is_err());
    }

    #[test]
    fn test_decode_text_value() {
        let utf8 = Charset::Utf8mb4;
        assert_eq!(decode_text_value(FieldType::Long, b"42", false, utf8), Value::Int(42));
        assert_eq!(
            decode_text_value(FieldType::Tiny, b"200", true, utf8),
            Value::SmallInt(200)
        );
        assert_eq!(
            decode_text_value(FieldType::LongLong, b"18446744073709551615", true, utf8),
            Value::Decimal("18446744073709551615".into())
        );
        assert_eq!(
            decode_text_value(FieldType::NewDecimal, b"1.50", false, utf8),
            Value::Decimal("1.50".into())
        );
        assert_eq!(
            decode_text_value(FieldType::Json, br#"{"a":1}"#, false, utf8),
            Value::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            decode_text_value(FieldType::Blob, &[0, 1], false, utf8),
            Value::Bytes(vec![0, 1])
        );
        assert_eq!(
            decode_text_value(FieldType::VarString, b"bla", false, utf8),
            Value::Text("bla".into())
        );
    }

    #[test]
    fn test_parse_text_row_with_null() {
        let columns = vec![
            ColumnDef::parse(&column_def_payload("t", "a", FieldType::Long, 0), Charset::Utf8mb4).unwrap(),
            ColumnDef::parse(&column_def_payload("t", "b", FieldType::VarString, 0), Charset::Utf8mb4)
                .unwrap(),
        ];
        let values = parse_text_row(&[0x01, b'7', 0xFB], &columns, &TextValueDecoder).unwrap();
        assert_eq!(values, vec![Value::Int(7), Value::Null]);

        // second field missing
        assert!(parse_text_row(&[0x01, b'7'], &columns, &TextValueDecoder).is_err());
        // declared length past the end
        assert!(parse_text_row(&[0x05, b'7'], &columns, &TextValueDecoder).is_err());
    }
}
