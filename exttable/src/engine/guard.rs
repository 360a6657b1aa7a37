use tracing::info;

use crate::bail;
use crate::engine::locks::TableLocks;
use crate::error::{ErrorKind, EtlResult};
use crate::store::staging::StagingStore;
use crate::types::ExternalTableDescriptor;

/// Checks edits to a table descriptor against the rows already staged for it.
///
/// The staged row layout follows the table type and field mappings, so these may only change
/// while the staging store is empty.
#[derive(Debug, Clone)]
pub struct DescriptorGuard<S> {
    store: S,
    locks: TableLocks,
}

impl<S> DescriptorGuard<S>
where
    S: StagingStore,
{
    pub fn new(store: S, locks: TableLocks) -> Self {
        Self { store, locks }
    }

    /// Validates `proposed` as a replacement for `current`.
    ///
    /// A shape change on a table with staged rows is rejected. When the store is empty it is
    /// dropped, so the next batch recreates it with the new shape.
    pub async fn check_change(
        &self,
        current: &ExternalTableDescriptor,
        proposed: &ExternalTableDescriptor,
    ) -> EtlResult<()> {
        proposed.validate()?;

        if current.id != proposed.id {
            bail!(
                ErrorKind::InvalidOperation,
                "Descriptor id cannot change",
                format!("table {} cannot become table {}", current.id, proposed.id)
            );
        }

        let shape_changed = current.table_type != proposed.table_type
            || current.field_mappings != proposed.field_mappings;
        if !shape_changed {
            return Ok(());
        }

        let _guard = self.locks.acquire(current.id).await;

        let rows = self.store.get_row_count(current).await?;
        if rows > 0 {
            bail!(
                ErrorKind::InvalidOperation,
                "Table shape cannot change while rows are staged",
                format!(
                    "table '{}' has {rows} staged rows; clear them before changing its type or mappings",
                    current.name
                )
            );
        }

        if self.store.store_exists(current.id).await? {
            self.store.delete_store(current.id).await?;
            info!(table_id = %current.id, "dropped empty staging store after shape change");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::UpsertEngine;
    use crate::notification::{ChangeNotificationQueue, MemoryNotificationSink};
    use crate::store::staging::MemoryStagingStore;
    use crate::test_utils::{column, key_column, table};
    use crate::types::{DataType, OperationKind, TableType};

    fn engine() -> UpsertEngine<MemoryStagingStore> {
        let queue = ChangeNotificationQueue::start(MemoryNotificationSink::new(), 4);
        UpsertEngine::new(MemoryStagingStore::new(), queue)
    }

    fn people() -> ExternalTableDescriptor {
        table(
            TableType::CampaignUniqueKeys,
            vec![key_column("id", DataType::Integer), column("name", DataType::Text)],
        )
    }

    #[tokio::test]
    async fn shape_change_rejected_while_rows_are_staged() {
        let engine = engine();
        let mut current = people();
        engine
            .apply_batch(&mut current, &json!({"id": 1}), OperationKind::Add)
            .await
            .unwrap();

        let mut proposed = current.clone();
        proposed.table_type = TableType::CampaignNonUniqueKeys;

        let err = engine
            .descriptor_guard()
            .check_change(&current, &proposed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(engine.store().store_exists(current.id).await.unwrap());
    }

    #[tokio::test]
    async fn empty_store_is_dropped_on_shape_change() {
        let engine = engine();
        let mut current = people();
        engine
            .apply_batch(&mut current, &json!([]), OperationKind::Add)
            .await
            .unwrap();

        let mut proposed = current.clone();
        proposed.field_mappings.push(column("city", DataType::Text));

        engine
            .descriptor_guard()
            .check_change(&current, &proposed)
            .await
            .unwrap();
        assert!(!engine.store().store_exists(current.id).await.unwrap());
    }

    #[tokio::test]
    async fn non_shape_changes_keep_the_store() {
        let engine = engine();
        let mut current = people();
        engine
            .apply_batch(&mut current, &json!({"id": 1}), OperationKind::Add)
            .await
            .unwrap();

        let mut proposed = current.clone();
        proposed.auto_update_interval_minutes = Some(5);

        engine
            .descriptor_guard()
            .check_change(&current, &proposed)
            .await
            .unwrap();
        assert_eq!(engine.store().get_row_count(&current).await.unwrap(), 1);
    }
}
