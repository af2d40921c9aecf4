//! MySQL protocol engine configuration.
//!
//! Connection establishment lives outside this crate, so the configuration
//! only covers what the command engine itself consults: row shapes,
//! diagnostics, LOCAL INFILE, date rendering and the initial charset.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use sqlwire_core::Error;
use sqlwire_core::error::ConfigError;

use crate::protocol::Charset;

/// Default number of characters of SQL kept in error diagnostics.
pub const DEFAULT_DEBUG_LEN: usize = 256;

/// Default transport read size for the blocking connection.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// How keyed rows are built from column names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NestTables {
    /// Flat rows keyed by column name
    #[default]
    Off,
    /// Rows nested by originating table: `{table: {column: value}}`
    Nested,
    /// Flat rows keyed by `table<separator>column`
    Joined(String),
}

/// Timezone used when rendering timestamps into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZone {
    /// Client local clock
    #[default]
    Local,
    /// UTC (`Z`)
    Utc,
    /// Fixed offset from UTC, in seconds east
    Offset(i32),
}

fn offset_pattern() -> Result<&'static Regex, Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([+-])(\d{2})(?::?(\d{2}))?$"))
        .as_ref()
        .map_err(|e| config_error(format!("invalid timezone pattern: {}", e)))
}

fn config_error(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        message: msg.into(),
        source: None,
    })
}

fn unknown_timezone(s: &str) -> Error {
    config_error(format!("Unknown timezone '{}'", s))
}

impl FromStr for TimeZone {
    type Err = Error;

    /// Accepts `local`, `Z` (or `UTC`), `+HH`, `+HH:MM`, `+HHMM` and the
    /// negative forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(TimeZone::Local);
        }
        if s == "Z" || s.eq_ignore_ascii_case("utc") {
            return Ok(TimeZone::Utc);
        }

        let caps = offset_pattern()?
            .captures(s)
            .ok_or_else(|| unknown_timezone(s))?;
        let hours: i32 = caps[2].parse().map_err(|_| unknown_timezone(s))?;
        let minutes: i32 = match caps.get(3) {
            Some(m) => m.as_str().parse().map_err(|_| unknown_timezone(s))?,
            None => 0,
        };
        if hours > 14 || minutes > 59 {
            return Err(unknown_timezone(s));
        }
        let seconds = hours * 3600 + minutes * 60;
        if seconds == 0 {
            return Ok(TimeZone::Utc);
        }
        Ok(TimeZone::Offset(if &caps[1] == "-" { -seconds } else { seconds }))
    }
}

/// Row shape resolved for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowShape {
    /// Positional values
    Array,
    /// Keyed by column name
    Flat,
    /// Keyed by `table<separator>column`
    Joined(String),
    /// Nested by table, then column
    Nested,
}

/// Per-command overrides of the connection configuration.
///
/// A field set to `Some` always wins, so `rows_as_array(false)` turns arrays
/// off for one command even when the connection enables them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub rows_as_array: Option<bool>,
    pub nest_tables: Option<NestTables>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return rows as positional arrays for this command.
    pub fn rows_as_array(mut self, enabled: bool) -> Self {
        self.rows_as_array = Some(enabled);
        self
    }

    /// Override the keyed row shape for this command.
    pub fn nest_tables(mut self, nest: NestTables) -> Self {
        self.nest_tables = Some(nest);
        self
    }
}

/// MySQL protocol engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlConfig {
    /// Maximum SQL characters shown in error diagnostics (default: 256)
    pub debug_len: usize,
    /// Return rows as positional arrays instead of keyed rows
    pub rows_as_array: bool,
    /// Keyed row shape
    pub nest_tables: NestTables,
    /// Local infile handling (disabled by default for security)
    pub local_infile: bool,
    /// Timezone used to render timestamp parameters
    pub timezone: TimeZone,
    /// Initial connection charset (default: utf8mb4)
    pub charset: Charset,
    /// Transport read size
    pub read_chunk_size: usize,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            debug_len: DEFAULT_DEBUG_LEN,
            rows_as_array: false,
            nest_tables: NestTables::Off,
            local_infile: false,
            timezone: TimeZone::Local,
            charset: Charset::Utf8mb4,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl MySqlConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many SQL characters are kept in error diagnostics.
    pub fn debug_len(mut self, len: usize) -> Self {
        self.debug_len = len;
        self
    }

    /// Return rows as positional arrays.
    pub fn rows_as_array(mut self, enabled: bool) -> Self {
        self.rows_as_array = enabled;
        self
    }

    /// Set the keyed row shape.
    pub fn nest_tables(mut self, nest: NestTables) -> Self {
        self.nest_tables = nest;
        self
    }

    /// Enable or disable local infile handling.
    ///
    /// # Security Warning
    /// A server (or anything impersonating it) can request any file the
    /// client process can read. Only enable if you trust the server.
    pub fn local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    /// Set the timezone used to render timestamps.
    pub fn timezone(mut self, timezone: TimeZone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Parse and set the timezone (`local`, `Z`, `+02:00`, ...).
    #[allow(clippy::result_large_err)]
    pub fn timezone_str(self, timezone: &str) -> Result<Self, Error> {
        Ok(self.timezone(timezone.parse()?))
    }

    /// Set the initial charset.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Set the initial charset by name.
    #[allow(clippy::result_large_err)]
    pub fn charset_name(self, name: &str) -> Result<Self, Error> {
        let charset = Charset::from_name(name)
            .ok_or_else(|| config_error(format!("Unknown charset '{}'", name)))?;
        Ok(self.charset(charset))
    }

    /// Set the transport read size.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Resolve the row shape for one command.
    pub fn row_shape(&self, options: &QueryOptions) -> RowShape {
        if options.rows_as_array.unwrap_or(self.rows_as_array) {
            return RowShape::Array;
        }
        match options.nest_tables.as_ref().unwrap_or(&self.nest_tables) {
            NestTables::Off => RowShape::Flat,
            NestTables::Nested => RowShape::Nested,
            NestTables::Joined(sep) => RowShape::Joined(sep.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MySqlConfig::new()
            .debug_len(20)
            .rows_as_array(true)
            .nest_tables(NestTables::Joined("_".into()))
            .local_infile(true)
            .timezone(TimeZone::Utc)
            .charset(Charset::Latin1)
            .read_chunk_size(0);

        assert_eq!(config.debug_len, 20);
        assert!(config.rows_as_array);
        assert!(config.local_infile);
        assert_eq!(config.timezone, TimeZone::Utc);
        assert_eq!(config.charset, Charset::Latin1);
        assert_eq!(config.read_chunk_size, 1);
    }

    #[test]
    fn test_default_config() {
        let config = MySqlConfig::default();
        assert_eq!(config.debug_len, DEFAULT_DEBUG_LEN);
        assert!(!config.local_infile);
        assert!(!config.rows_as_array);
        assert_eq!(config.nest_tables, NestTables::Off);
        assert_eq!(config.charset, Charset::Utf8mb4);
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!("local".parse::<TimeZone>().unwrap(), TimeZone::Local);
        assert_eq!("Z".parse::<TimeZone>().unwrap(), TimeZone::Utc);
        assert_eq!("+02".parse::<TimeZone>().unwrap(), TimeZone::Offset(7200));
        assert_eq!("+02:00".parse::<TimeZone>().unwrap(), TimeZone::Offset(7200));
        assert_eq!("-01:00".parse::<TimeZone>().unwrap(), TimeZone::Offset(-3600));
        assert_eq!("+05:30".parse::<TimeZone>().unwrap(), TimeZone::Offset(19800));
        assert_eq!("+00:00".parse::<TimeZone>().unwrap(), TimeZone::Utc);

        let err = "+e:00".parse::<TimeZone>().unwrap_err();
        assert!(err.to_string().contains("Unknown timezone '+e:00'"));
        assert!("unknown".parse::<TimeZone>().is_err());
        assert!("+25:00".parse::<TimeZone>().is_err());
    }

    #[test]
    fn test_unknown_charset() {
        let err = MySqlConfig::new().charset_name("unknown").unwrap_err();
        assert!(err.to_string().contains("Unknown charset"));
        assert_eq!(
            MySqlConfig::new().charset_name("latin1").unwrap().charset,
            Charset::Latin1
        );
    }

    #[test]
    fn test_query_options_override_config() {
        let config = MySqlConfig::new().nest_tables(NestTables::Nested);
        assert_eq!(config.row_shape(&QueryOptions::new()), RowShape::Nested);
        assert_eq!(
            config.row_shape(&QueryOptions::new().rows_as_array(true)),
            RowShape::Array
        );
        assert_eq!(
            config.row_shape(&QueryOptions::new().nest_tables(NestTables::Joined("_".into()))),
            RowShape::Joined("_".into())
        );

        let arrays = MySqlConfig::new().rows_as_array(true);
        assert_eq!(
            arrays.row_shape(&QueryOptions::new().rows_as_array(false)),
            RowShape::Flat
        );
    }
}
