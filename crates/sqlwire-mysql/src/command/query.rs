//! Text-protocol command building.
//!
//! `?` placeholders outside quoted literals, identifiers and comments are
//! replaced by parameter values written straight into the packet, so large
//! values stream through the writer without an intermediate SQL string.

use std::fmt::Write as _;

use chrono::DateTime;
use sqlwire_core::{Result, Value};

use crate::config::TimeZone;
use crate::error::parameter_error;
use crate::protocol::{Command, PacketWriter};

/// Split SQL into the text segments around each `?` placeholder.
///
/// A statement with `n` placeholders yields `n + 1` segments.
pub fn split_placeholders(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'?' => {
                parts.push(&sql[start..i]);
                start = i + 1;
                i += 1;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    let b = bytes[i];
                    if b == b'\\' && quote != b'`' {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    if b == quote {
                        // doubled quote stays inside the literal
                        if bytes.get(i) == Some(&quote) {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line(bytes, i);
            }
            b'#' => {
                i = skip_line(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => i += 1,
        }
    }

    parts.push(&sql[start.min(sql.len())..]);
    parts
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

/// Write a COM_QUERY packet payload, binding `params` to the placeholders.
///
/// Fails before writing anything if a placeholder has no parameter.
#[allow(clippy::result_large_err)]
pub fn write_query(
    writer: &mut PacketWriter,
    sql: &str,
    params: &[Value],
    timezone: TimeZone,
) -> Result<()> {
    let parts = split_placeholders(sql);
    let placeholders = parts.len() - 1;
    if params.len() < placeholders {
        return Err(parameter_error(format!(
            "Parameter at position {} is not set",
            params.len() + 1
        )));
    }
    for param in &params[..placeholders] {
        if let Value::Timestamp(micros) = param {
            if DateTime::from_timestamp_micros(*micros).is_none() {
                return Err(parameter_error(format!("Timestamp {} out of range", micros)));
            }
        }
    }

    writer.write_u8(Command::Query as u8);
    if placeholders == 0 {
        writer.write_str(sql);
        return Ok(());
    }

    let mut parts = parts.into_iter();
    if let Some(first) = parts.next() {
        writer.write_str(first);
    }
    for (part, param) in parts.zip(params) {
        write_param(writer, param, timezone);
        writer.write_str(part);
    }
    Ok(())
}

fn is_numeric_literal(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
}

fn write_float(writer: &mut PacketWriter, f: f64) {
    if f.is_nan() {
        writer.write_str_ascii("NULL");
    } else if f.is_infinite() {
        writer.write_str_ascii(if f.is_sign_positive() { "1e308" } else { "-1e308" });
    } else {
        writer.write_str_ascii(&f.to_string());
    }
}

fn format_time(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let secs = abs / 1_000_000;
    format!(
        "{}{:02}:{:02}:{:02}.{:06}",
        sign,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        abs % 1_000_000
    )
}

fn format_date(days: i32) -> Option<String> {
    DateTime::from_timestamp(i64::from(days) * 86_400, 0)
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

/// Write one parameter as an SQL literal.
pub fn write_param(writer: &mut PacketWriter, value: &Value, timezone: TimeZone) {
    match value {
        Value::Null => writer.write_str_ascii("NULL"),
        Value::Bool(b) => writer.write_str_ascii(if *b { "true" } else { "false" }),
        Value::TinyInt(v) => writer.write_str_ascii(&v.to_string()),
        Value::SmallInt(v) => writer.write_str_ascii(&v.to_string()),
        Value::Int(v) => writer.write_str_ascii(&v.to_string()),
        Value::BigInt(v) => writer.write_str_ascii(&v.to_string()),
        Value::Float(v) if v.is_finite() => writer.write_str_ascii(&v.to_string()),
        Value::Float(v) => write_float(writer, f64::from(*v)),
        Value::Double(v) => write_float(writer, *v),
        Value::Decimal(s) if is_numeric_literal(s) => writer.write_str_ascii(s),
        Value::Decimal(s) | Value::Text(s) => {
            writer.write_u8(b'\'');
            writer.write_str_escaped(s);
            writer.write_u8(b'\'');
        }
        Value::Bytes(b) => {
            writer.write_str_ascii("_binary'");
            writer.write_bytes_escaped(b);
            writer.write_u8(b'\'');
        }
        Value::Date(days) => match format_date(*days) {
            Some(date) => {
                writer.write_u8(b'\'');
                writer.write_str_ascii(&date);
                writer.write_u8(b'\'');
            }
            None => writer.write_str_ascii("NULL"),
        },
        Value::Time(micros) => {
            writer.write_u8(b'\'');
            writer.write_str_ascii(&format_time(*micros));
            writer.write_u8(b'\'');
        }
        Value::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
            Some(instant) => {
                writer.write_u8(b'\'');
                writer.write_date(&instant, timezone);
                writer.write_u8(b'\'');
            }
            None => writer.write_str_ascii("NULL"),
        },
        Value::Json(json) => {
            writer.write_u8(b'\'');
            writer.write_str_escaped(&json.to_string());
            writer.write_u8(b'\'');
        }
    }
}

/// Write a command whose payload is a single string (COM_INIT_DB, ...).
pub fn write_simple_command(writer: &mut PacketWriter, command: Command, arg: Option<&str>) {
    writer.write_u8(command as u8);
    if let Some(arg) = arg {
        writer.write_str(arg);
    }
}

fn truncate_chars(s: &mut String, max_chars: usize) -> bool {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            s.truncate(idx);
            true
        }
        None => false,
    }
}

fn log_param(out: &mut String, param: &Value) {
    match param {
        Value::Null => out.push_str("null"),
        Value::Text(s) => {
            let _ = write!(out, "'{}'", s);
        }
        Value::Bytes(b) => {
            out.push_str("0x");
            for byte in b.iter().take(1024) {
                let _ = write!(out, "{:02x}", byte);
            }
        }
        Value::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
            Some(dt) => {
                let _ = write!(out, "'{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f"));
            }
            None => out.push_str(&micros.to_string()),
        },
        Value::Date(days) => match format_date(*days) {
            Some(d) => {
                let _ = write!(out, "'{}'", d);
            }
            None => out.push_str(&days.to_string()),
        },
        Value::Time(micros) => {
            let _ = write!(out, "'{}'", format_time(*micros));
        }
        Value::Json(j) => out.push_str(&j.to_string()),
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::TinyInt(v) => out.push_str(&v.to_string()),
        Value::SmallInt(v) => out.push_str(&v.to_string()),
        Value::Int(v) => out.push_str(&v.to_string()),
        Value::BigInt(v) => out.push_str(&v.to_string()),
        Value::Float(v) => out.push_str(&v.to_string()),
        Value::Double(v) => out.push_str(&v.to_string()),
        Value::Decimal(s) => out.push_str(s),
    }
}

/// Render SQL and its parameters for error diagnostics.
///
/// SQL longer than `debug_len` characters is cut and suffixed with `...`
/// (parameters are then omitted); the parameter list is cut the same way
/// once the whole message exceeds `debug_len`.
pub fn display_sql(sql: &str, params: &[Value], debug_len: usize) -> String {
    if sql.chars().count() > debug_len {
        let mut cut = sql.to_string();
        truncate_chars(&mut cut, debug_len);
        return format!("sql: {}...", cut);
    }

    let mut msg = format!("sql: {} - parameters:[", sql);
    for (i, param) in params.iter().enumerate() {
        if i != 0 {
            msg.push(',');
        }
        log_param(&mut msg, param);
        if truncate_chars(&mut msg, debug_len) {
            msg.push_str("...");
            break;
        }
    }
    msg.push(']');
    msg
}
