//! Resolution of field mappings into row schemas.

mod mapper;

pub use mapper::{
    ColumnSchema, EXTERNAL_ID_COLUMN, IdSequence, LOAD_STATE_COLUMN, LOAD_TIMESTAMP_COLUMN,
    ResolvedSchema, resolve_schema,
};
