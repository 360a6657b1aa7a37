use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Identifier of an external table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub i64);

impl TableId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a remote listener resource feeding a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl ResourceId {
    /// Whether the id refers to a stored resource rather than an unset placeholder.
    pub fn is_assigned(&self) -> bool {
        self.0 >= 1
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How rows of a table relate to each other through their key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Keys are unique; the table may be uploaded to an analytic destination.
    Analysis,
    /// Keys are unique; the table is bound to a campaign and never uploaded.
    CampaignUniqueKeys,
    /// Keys are informational only; rows are appended without matching.
    CampaignNonUniqueKeys,
}

impl TableType {
    pub fn enforces_unique_keys(&self) -> bool {
        !matches!(self, TableType::CampaignNonUniqueKeys)
    }

    pub fn is_campaign(&self) -> bool {
        matches!(
            self,
            TableType::CampaignUniqueKeys | TableType::CampaignNonUniqueKeys
        )
    }
}

/// Value types a source column may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Integer,
    BigInteger,
    Decimal,
    Float,
    Boolean,
    DateTime,
    Guid,
    Geographic,
}

/// Source side of a field mapping.
///
/// The name is a dotted path into the raw record, for example `addr.city`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub key_ordinal: u16,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    /// Suppressed columns are staged but not offered as output fields.
    #[serde(default)]
    pub suppressed: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: SourceColumn,
    pub target: TargetColumn,
}

impl FieldMapping {
    pub fn is_key(&self) -> bool {
        self.source.is_key
    }
}

/// Lifecycle flags of a stored object.
///
/// Only usable objects take part in scheduling or ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default)]
    pub shortcut: bool,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub placeholder: bool,
}

fn default_valid() -> bool {
    true
}

impl ObjectState {
    pub fn active() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.deleted && self.valid && !self.shortcut && !self.template && !self.placeholder
    }
}

/// Remote endpoint feeding an external table with incremental events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerResource {
    pub id: ResourceId,
    pub name: String,
    /// Full endpoint location, containing an `/API/` separator.
    pub resource_location: String,
    #[serde(default = "ObjectState::active")]
    pub state: ObjectState,
}

impl ListenerResource {
    /// Whether the resource can currently be polled.
    pub fn is_pollable(&self) -> bool {
        self.state.is_usable() && !self.resource_location.trim().is_empty()
    }
}

/// Definition of an external table and its ingestion progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTableDescriptor {
    pub id: TableId,
    pub name: String,
    /// Name of the table created in the analytic destination.
    pub target_table: String,
    pub table_type: TableType,
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub auto_update_source: Option<ResourceId>,
    #[serde(default)]
    pub auto_update_interval_minutes: Option<u32>,
    /// Highest listener event id durably staged so far.
    #[serde(default)]
    pub last_fetched_event_id: Option<u64>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default = "ObjectState::active")]
    pub state: ObjectState,
}

impl ExternalTableDescriptor {
    pub fn has_auto_update_source(&self) -> bool {
        self.auto_update_source
            .is_some_and(|source| source.is_assigned())
    }

    /// Key mappings ordered by key ordinal, ties broken by declaration order.
    pub fn key_mappings(&self) -> Vec<&FieldMapping> {
        let mut keys: Vec<&FieldMapping> =
            self.field_mappings.iter().filter(|m| m.is_key()).collect();
        keys.sort_by_key(|m| m.source.key_ordinal);
        keys
    }

    /// Target columns exposed to consumers of the table.
    pub fn output_fields(&self) -> Vec<&str> {
        self.field_mappings
            .iter()
            .filter(|m| !m.source.suppressed)
            .map(|m| m.target.name.as_str())
            .collect()
    }

    /// Advances the listener watermark, never moving it backwards.
    ///
    /// Returns whether the watermark changed.
    pub fn advance_watermark(&mut self, event_id: u64) -> bool {
        match self.last_fetched_event_id {
            Some(current) if current >= event_id => false,
            _ => {
                self.last_fetched_event_id = Some(event_id);
                true
            }
        }
    }

    /// Checks the structural rules a table definition must satisfy before it is saved.
    pub fn validate(&self) -> EtlResult<()> {
        let mut errors: Vec<EtlError> = Vec::new();

        if !self.field_mappings.iter().any(FieldMapping::is_key) {
            errors.push(etl_error!(
                ErrorKind::ValidationError,
                "Table has no key field",
                format!("table '{}' must map at least one key column", self.name)
            ));
        }

        if self.table_type.is_campaign() && self.output_fields().is_empty() {
            errors.push(etl_error!(
                ErrorKind::ValidationError,
                "Campaign table has no output field",
                format!(
                    "campaign table '{}' needs at least one non-suppressed mapping",
                    self.name
                )
            ));
        }

        let mut seen = HashSet::new();
        for mapping in &self.field_mappings {
            let target = mapping.target.name.trim();
            if target.is_empty() {
                errors.push(etl_error!(
                    ErrorKind::ValidationError,
                    "Target column name is empty",
                    format!("source column '{}' maps to an empty name", mapping.source.name)
                ));
            } else if !seen.insert(target.to_lowercase()) {
                errors.push(etl_error!(
                    ErrorKind::ValidationError,
                    "Duplicate target column",
                    format!("'{target}' is mapped more than once")
                ));
            }
        }

        if self.auto_update_interval_minutes == Some(0) {
            errors.push(etl_error!(
                ErrorKind::ValidationError,
                "Auto-update interval must be positive",
                format!("table '{}' has an interval of 0 minutes", self.name)
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{column, key_column, table};

    #[test]
    fn key_mappings_follow_ordinal() {
        let mut descriptor = table(
            TableType::Analysis,
            vec![key_column("b", DataType::Integer), column("c", DataType::Text)],
        );
        descriptor.field_mappings.push(key_column("a", DataType::Integer));
        descriptor.field_mappings[0].source.key_ordinal = 2;
        descriptor.field_mappings[2].source.key_ordinal = 1;

        let keys: Vec<&str> = descriptor
            .key_mappings()
            .iter()
            .map(|m| m.target.name.as_str())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn watermark_never_regresses() {
        let mut descriptor = table(TableType::Analysis, vec![key_column("id", DataType::Integer)]);

        assert!(descriptor.advance_watermark(7));
        assert!(!descriptor.advance_watermark(3));
        assert!(!descriptor.advance_watermark(7));
        assert_eq!(descriptor.last_fetched_event_id, Some(7));
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut descriptor = table(
            TableType::CampaignUniqueKeys,
            vec![column("name", DataType::Text), column("NAME", DataType::Text)],
        );
        for mapping in &mut descriptor.field_mappings {
            mapping.source.suppressed = true;
        }
        descriptor.auto_update_interval_minutes = Some(0);

        let err = descriptor.validate().unwrap_err();
        assert_eq!(err.kinds().len(), 4);
        assert!(err.kinds().iter().all(|k| *k == ErrorKind::ValidationError));
    }

    #[test]
    fn output_fields_skip_suppressed_columns() {
        let mut descriptor = table(
            TableType::Analysis,
            vec![key_column("id", DataType::Integer), column("secret", DataType::Text)],
        );
        descriptor.field_mappings[1].source.suppressed = true;

        assert_eq!(descriptor.output_fields(), ["id"]);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn unusable_objects_are_detected() {
        assert!(ObjectState::active().is_usable());
        let template = ObjectState {
            template: true,
            ..ObjectState::active()
        };
        assert!(!template.is_usable());
        assert!(!ObjectState::default().is_usable());
    }
}
