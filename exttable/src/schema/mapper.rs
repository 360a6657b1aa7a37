use std::collections::HashSet;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{DataType, ExternalTableDescriptor, FieldMapping, OperationKind, TableType};

/// Internal row id column, first in every staged add/update schema.
pub const EXTERNAL_ID_COLUMN: &str = "ExternalId";

pub const LOAD_STATE_COLUMN: &str = "ExtTabLoadState";

pub const LOAD_TIMESTAMP_COLUMN: &str = "ExtTabTimeStamp";

const CONTROL_COLUMNS: [&str; 3] = [EXTERNAL_ID_COLUMN, LOAD_STATE_COLUMN, LOAD_TIMESTAMP_COLUMN];

/// Width of a textual GUID.
const GUID_TEXT_LENGTH: u32 = 36;

/// A column of the resolved row schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    /// Dotted path of the source field, already split into segments.
    pub source_path: Vec<String>,
    pub data_type: DataType,
    pub max_length: Option<u32>,
    pub nullable: bool,
    pub is_key: bool,
    pub key_ordinal: u16,
}

impl ColumnSchema {
    fn from_mapping(mapping: &FieldMapping, table: &ExternalTableDescriptor) -> Self {
        let source = &mapping.source;
        let max_length = match source.data_type {
            DataType::Text | DataType::Geographic => source.length,
            DataType::Guid => Some(GUID_TEXT_LENGTH),
            _ => None,
        };

        Self {
            name: mapping.target.name.clone(),
            source_path: source.name.split('.').map(str::to_owned).collect(),
            data_type: source.data_type,
            max_length,
            // Analysis keys form the destination primary key.
            nullable: source.is_nullable
                && !(table.table_type == TableType::Analysis && source.is_key),
            is_key: source.is_key,
            key_ordinal: source.key_ordinal,
        }
    }
}

/// Ordered column layout used to transform and stage one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub operation: OperationKind,
    pub columns: Vec<ColumnSchema>,
    /// Whether the control columns precede the user columns when staged.
    pub has_control_columns: bool,
}

impl ResolvedSchema {
    /// Positions of the key columns within [`ResolvedSchema::columns`].
    pub fn key_positions(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_key)
            .map(|(index, _)| index)
            .collect()
    }

    /// Position of a column by case-insensitive name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Every staged column name, control columns first.
    pub fn staged_column_names(&self) -> Vec<&str> {
        let control = if self.has_control_columns {
            &CONTROL_COLUMNS[..]
        } else {
            &[]
        };

        control
            .iter()
            .copied()
            .chain(self.columns.iter().map(|column| column.name.as_str()))
            .collect()
    }
}

/// Resolves the column layout of `table` for a batch of `operation`.
///
/// Deletes only carry the key columns. Adds and updates carry every mapping, preceded by the
/// internal id, load state and load timestamp control columns.
pub fn resolve_schema(
    table: &ExternalTableDescriptor,
    operation: OperationKind,
) -> EtlResult<ResolvedSchema> {
    let is_delete = operation == OperationKind::Delete;

    let columns: Vec<ColumnSchema> = table
        .field_mappings
        .iter()
        .filter(|mapping| !is_delete || mapping.is_key())
        .map(|mapping| ColumnSchema::from_mapping(mapping, table))
        .collect();

    if is_delete && columns.is_empty() {
        bail!(
            ErrorKind::SchemaError,
            "Delete requires key columns",
            format!("table '{}' has no key mapping", table.name)
        );
    }

    let mut seen: HashSet<String> = HashSet::new();
    if !is_delete {
        seen.extend(CONTROL_COLUMNS.iter().map(|name| name.to_lowercase()));
    }
    for column in &columns {
        if !seen.insert(column.name.to_lowercase()) {
            bail!(
                ErrorKind::SchemaError,
                "Duplicate target column",
                format!("table '{}' maps '{}' more than once", table.name, column.name)
            );
        }
    }

    Ok(ResolvedSchema {
        operation,
        columns,
        has_control_columns: !is_delete,
    })
}

/// Batch-local sequence of provisional row ids.
///
/// Starts at -1 and steps by -1, so later rows receive more negative ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSequence {
    next: i64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self { next: -1 }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next -= 1;
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}
