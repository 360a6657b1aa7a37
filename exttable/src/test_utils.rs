use crate::types::{
    DataType, ExternalTableDescriptor, FieldMapping, ObjectState, SourceColumn, TableId,
    TableType, TargetColumn,
};

/// Mapping whose target is the last segment of the dotted source path.
pub fn column(path: &str, data_type: DataType) -> FieldMapping {
    let target = path.rsplit('.').next().unwrap_or(path);

    FieldMapping {
        source: SourceColumn {
            name: path.to_owned(),
            data_type,
            length: None,
            is_key: false,
            key_ordinal: 0,
            is_nullable: true,
            suppressed: false,
        },
        target: TargetColumn {
            name: target.to_owned(),
        },
    }
}

pub fn key_column(path: &str, data_type: DataType) -> FieldMapping {
    let mut mapping = column(path, data_type);
    mapping.source.is_key = true;
    mapping.source.key_ordinal = 1;
    mapping
}

pub fn table(table_type: TableType, field_mappings: Vec<FieldMapping>) -> ExternalTableDescriptor {
    ExternalTableDescriptor {
        id: TableId::new(1),
        name: "people".to_owned(),
        target_table: "People".to_owned(),
        table_type,
        field_mappings,
        auto_update_source: None,
        auto_update_interval_minutes: None,
        last_fetched_event_id: None,
        last_run_at: None,
        state: ObjectState::active(),
    }
}
