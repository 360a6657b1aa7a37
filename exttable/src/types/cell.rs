use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed value held in one column of a staged row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Numeric(BigDecimal),
    String(String),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Interprets the cell as a listener event id.
    pub fn as_event_id(&self) -> Option<u64> {
        match self {
            Cell::I64(value) => u64::try_from(*value).ok(),
            Cell::Numeric(value) => value.to_string().parse().ok(),
            Cell::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::Numeric(value) => write!(f, "{value}"),
            Cell::String(value) => f.write_str(value),
            Cell::TimestampTz(value) => write!(f, "{}", value.to_rfc3339()),
            Cell::Uuid(value) => write!(f, "{value}"),
        }
    }
}
