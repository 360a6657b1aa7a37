//! Data model shared by ingestion, scheduling and upload.

mod cell;
mod delta;
mod descriptor;
mod row;

pub use cell::Cell;
pub use delta::{DeltaSet, OperationKind};
pub use descriptor::{
    DataType, ExternalTableDescriptor, FieldMapping, ListenerResource, ObjectState, ResourceId,
    SourceColumn, TableId, TableType, TargetColumn,
};
pub use row::{LoadState, PendingRow, RowId, StagedRow, TableRow};
