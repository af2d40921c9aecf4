//! Core types for sqlwire.
//!
//! This crate provides the types shared by the wire protocol drivers:
//!
//! - `Error` taxonomy (connection, query, protocol, configuration)
//! - `Value` for parameters and decoded fields
//! - `Row` with shared column metadata
//! - `Outcome` / `Cx` re-exports from asupersync for the async shells

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod error;
pub mod row;
pub mod value;

pub use error::{Error, Result};
pub use row::{ColumnInfo, Row};
pub use value::Value;
