use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use crate::bail;
use crate::engine::guard::DescriptorGuard;
use crate::engine::locks::TableLocks;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::{EXTTABLE_BATCH_DURATION_SECONDS, EXTTABLE_ROWS_STAGED_TOTAL, OPERATION_LABEL};
use crate::notification::{ChangeNotification, ChangeNotificationQueue};
use crate::schema::resolve_schema;
use crate::store::staging::StagingStore;
use crate::transform::RowTransformer;
use crate::types::{DeltaSet, ExternalTableDescriptor, OperationKind};

/// Result of one [`UpsertEngine::apply_batch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of raw records transformed, malformed ones included.
    pub processed: usize,
    pub delta: DeltaSet,
}

/// Applies raw record batches to the staging store of a table.
///
/// | table type | add | update | delete |
/// |---|---|---|---|
/// | `CampaignNonUniqueKeys` | append | rejected | rejected |
/// | `CampaignUniqueKeys`, `Analysis` | upsert by key | upsert by key | delete by key |
///
/// The whole batch runs under the table's lock, so writes to one staging store never
/// interleave. The resulting [`DeltaSet`] is handed to the notification queue before returning;
/// delivery happens on the queue's worker.
#[derive(Debug, Clone)]
pub struct UpsertEngine<S> {
    store: S,
    notifications: ChangeNotificationQueue,
    locks: TableLocks,
}

impl<S> UpsertEngine<S>
where
    S: StagingStore + Clone,
{
    pub fn new(store: S, notifications: ChangeNotificationQueue) -> Self {
        Self {
            store,
            notifications,
            locks: TableLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Guard for descriptor edits, sharing this engine's table locks.
    pub fn descriptor_guard(&self) -> DescriptorGuard<S> {
        DescriptorGuard::new(self.store.clone(), self.locks.clone())
    }

    /// Transforms `payload` with the table's mappings and applies it as `operation`.
    ///
    /// For tables fed by a listener, the descriptor's watermark is advanced to the largest event
    /// id of the batch once the rows are staged. Persisting the descriptor is left to the caller.
    pub async fn apply_batch(
        &self,
        table: &mut ExternalTableDescriptor,
        payload: &Value,
        operation: OperationKind,
    ) -> EtlResult<BatchOutcome> {
        let _guard = self.locks.acquire(table.id).await;
        let started = Instant::now();

        let unique_keys = table.table_type.enforces_unique_keys();
        if !unique_keys && operation != OperationKind::Add {
            bail!(
                ErrorKind::InvalidOperation,
                "Operation requires unique keys",
                format!(
                    "cannot {operation} rows of table '{}' because its keys are not unique",
                    table.name
                )
            );
        }
        if unique_keys && table.key_mappings().is_empty() {
            bail!(
                ErrorKind::SchemaError,
                "Upsert requires key columns",
                format!("table '{}' has no key mapping", table.name)
            );
        }

        let schema = resolve_schema(table, operation)?;
        let batch =
            RowTransformer::new(&schema, table.has_auto_update_source()).transform_payload(payload);
        let processed = batch.processed();
        let max_event_id = batch.max_event_id;

        self.store.create_store(table).await?;

        let loaded_at = Utc::now();
        let delta = match operation {
            OperationKind::Delete => {
                let deleted = self
                    .store
                    .delete_rows(table, batch.into_table_rows())
                    .await?;
                DeltaSet::deleted(deleted)
            }
            OperationKind::Add if !unique_keys => {
                let added = self.store.add_rows(table, batch.rows, loaded_at).await?;
                DeltaSet::added(added)
            }
            OperationKind::Add | OperationKind::Update => {
                let outcome = self.store.upsert_rows(table, batch.rows, loaded_at).await?;
                DeltaSet {
                    added: outcome.added.into_iter().collect(),
                    updated: outcome.updated.into_iter().collect(),
                    ..DeltaSet::default()
                }
            }
        };

        if let Some(event_id) = max_event_id
            && table.advance_watermark(event_id)
        {
            debug!(table_id = %table.id, watermark = event_id, "advanced listener watermark");
        }

        counter!(EXTTABLE_ROWS_STAGED_TOTAL, OPERATION_LABEL => operation.as_static_str())
            .increment(processed as u64);
        histogram!(EXTTABLE_BATCH_DURATION_SECONDS, OPERATION_LABEL => operation.as_static_str())
            .record(started.elapsed().as_secs_f64());

        debug!(
            table_id = %table.id,
            %operation,
            processed,
            added = delta.added.len(),
            updated = delta.updated.len(),
            deleted = delta.deleted.len(),
            "applied batch"
        );

        if !delta.is_empty() {
            let notification =
                ChangeNotification::object_action(table.id, table.name.clone(), delta.clone());
            // The rows are staged, so a closed queue only loses the announcement.
            if let Err(err) = self.notifications.enqueue(notification).await {
                warn!(table_id = %table.id, error = %err, "change notification dropped");
            }
        }

        Ok(BatchOutcome { processed, delta })
    }
}
