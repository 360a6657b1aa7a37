//! Conversion of raw records into typed rows.

pub mod path;
mod row;

pub use row::{EVENT_ID_COLUMN, RowTransformer, TransformedBatch, convert_leaf};
