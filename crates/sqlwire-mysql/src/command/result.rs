//! Decoded command outcomes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sqlwire_core::{ColumnInfo, Row, Value};

use crate::config::RowShape;
use crate::types::ColumnDef;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeResult {
    /// Number of affected rows
    pub affected_rows: u64,
    /// Last insert ID
    pub insert_id: i64,
    /// Number of warnings
    pub warning_status: u16,
    /// Human readable info string (e.g. "Rows matched: 1  Changed: 1")
    pub info: String,
    /// Server flagged OUT parameters for this statement
    pub out_params: bool,
}

/// One decoded row, shaped per the command's row options.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRow {
    /// Values in column order
    Array(Vec<Value>),
    /// Flat row keyed by column name (or `table<sep>column`)
    Keyed(Row),
    /// Values grouped by table, then column name
    Nested(BTreeMap<String, BTreeMap<String, Value>>),
}

impl DecodedRow {
    /// Look up a value by column key (flat rows) or positional index
    /// rendered as a string (array rows).
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            DecodedRow::Array(values) => key.parse::<usize>().ok().and_then(|i| values.get(i)),
            DecodedRow::Keyed(row) => row.get_by_name(key),
            DecodedRow::Nested(_) => None,
        }
    }

    /// Look up a value in a nested row.
    pub fn get_nested(&self, table: &str, column: &str) -> Option<&Value> {
        match self {
            DecodedRow::Nested(tables) => tables.get(table).and_then(|t| t.get(column)),
            _ => None,
        }
    }
}

/// Rows of one result set plus their column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Arc<[ColumnDef]>,
    pub rows: Vec<DecodedRow>,
    /// This set carries OUT parameters of a stored procedure call
    pub out_params: bool,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One server response within a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Change(ChangeResult),
    Rows(ResultSet),
}

impl Response {
    pub fn as_change(&self) -> Option<&ChangeResult> {
        match self {
            Response::Change(c) => Some(c),
            Response::Rows(_) => None,
        }
    }

    pub fn as_rows(&self) -> Option<&ResultSet> {
        match self {
            Response::Rows(r) => Some(r),
            Response::Change(_) => None,
        }
    }
}

/// Final value of a command: a single response, or every response of a
/// multi-result exchange in server order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Single(Response),
    Multi(Vec<Response>),
}

impl QueryResult {
    pub(crate) fn from_responses(mut responses: Vec<Response>) -> Self {
        if responses.len() == 1 {
            if let Some(only) = responses.pop() {
                return QueryResult::Single(only);
            }
        }
        QueryResult::Multi(responses)
    }

    /// All responses, in server order.
    pub fn responses(&self) -> &[Response] {
        match self {
            QueryResult::Single(r) => std::slice::from_ref(r),
            QueryResult::Multi(rs) => rs,
        }
    }

    pub fn into_responses(self) -> Vec<Response> {
        match self {
            QueryResult::Single(r) => vec![r],
            QueryResult::Multi(rs) => rs,
        }
    }

    /// The first result set, if any.
    pub fn first_rows(&self) -> Option<&ResultSet> {
        self.responses().iter().find_map(Response::as_rows)
    }

    /// The first change result, if any.
    pub fn first_change(&self) -> Option<&ChangeResult> {
        self.responses().iter().find_map(Response::as_change)
    }
}

/// Row keys computed once all column definitions are known.
#[derive(Debug, Clone)]
pub(crate) enum RowHeader {
    Array,
    Flat(Arc<ColumnInfo>),
    Nested(Vec<(String, String)>),
}

impl RowHeader {
    pub(crate) fn build(shape: &RowShape, columns: &[ColumnDef]) -> Self {
        match shape {
            RowShape::Array => RowHeader::Array,
            RowShape::Flat => RowHeader::Flat(Arc::new(ColumnInfo::new(
                columns.iter().map(|c| c.name.clone()).collect(),
            ))),
            RowShape::Joined(sep) => RowHeader::Flat(Arc::new(ColumnInfo::new(
                columns
                    .iter()
                    .map(|c| format!("{}{}{}", c.table, sep, c.name))
                    .collect(),
            ))),
            RowShape::Nested => RowHeader::Nested(
                columns
                    .iter()
                    .map(|c| (c.table.clone(), c.name.clone()))
                    .collect(),
            ),
        }
    }

    pub(crate) fn make_row(&self, values: Vec<Value>) -> DecodedRow {
        match self {
            RowHeader::Array => DecodedRow::Array(values),
            RowHeader::Flat(info) => DecodedRow::Keyed(Row::with_columns(Arc::clone(info), values)),
            RowHeader::Nested(keys) => {
                let mut tables: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
                for ((table, name), value) in keys.iter().zip(values) {
                    tables
                        .entry(table.clone())
                        .or_default()
                        .insert(name.clone(), value);
                }
                DecodedRow::Nested(tables)
            }
        }
    }
}
