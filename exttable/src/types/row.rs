use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Cell;

/// Internal id of a staged row.
///
/// Ids are negative and decrease as rows are added, so the newest row has the most negative id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload progress of a staged row. The discriminants are the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum LoadState {
    Pending = 1,
    Uploaded = 2,
}

impl LoadState {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(LoadState::Pending),
            2 => Some(LoadState::Uploaded),
            _ => None,
        }
    }
}

/// Values for the user columns of one row, in schema order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Projects the values at `positions`, used to extract key values.
    pub fn project(&self, positions: &[usize]) -> Vec<Cell> {
        positions
            .iter()
            .map(|&index| self.values.get(index).cloned().unwrap_or(Cell::Null))
            .collect()
    }
}

/// A transformed row handed to the staging store.
///
/// The provisional id comes from the batch-local sequence; stores translate it into a durable
/// [`RowId`] unique within the table.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub provisional_id: i64,
    pub row: TableRow,
}

/// A row held by a staging store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub id: RowId,
    pub load_state: LoadState,
    pub loaded_at: DateTime<Utc>,
    pub row: TableRow,
}
