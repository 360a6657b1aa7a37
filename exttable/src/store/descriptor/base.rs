use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::EtlResult;
use crate::types::{ExternalTableDescriptor, ListenerResource, ResourceId, TableId};

/// Persistent catalog of table descriptors and listener resources.
///
/// Descriptors carry the listener watermark and last run instant. Auto-update runs persist them
/// through [`DescriptorStore::record_progress`], so edits saved while a fetch is in flight survive.
pub trait DescriptorStore {
    /// Returns the ids of every stored table.
    fn list_table_ids(&self) -> impl Future<Output = EtlResult<Vec<TableId>>> + Send;

    fn get_table(
        &self,
        table_id: TableId,
    ) -> impl Future<Output = EtlResult<Option<ExternalTableDescriptor>>> + Send;

    /// Inserts or replaces a descriptor.
    fn store_table(
        &self,
        table: ExternalTableDescriptor,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Advances the stored watermark to `last_fetched_event_id` and stamps `last_run_at`,
    /// leaving every other field of the stored descriptor as it is.
    ///
    /// The watermark never moves backwards. Returns `false` when the table no longer exists.
    fn record_progress(
        &self,
        table_id: TableId,
        last_fetched_event_id: Option<u64>,
        last_run_at: DateTime<Utc>,
    ) -> impl Future<Output = EtlResult<bool>> + Send;

    fn get_listener(
        &self,
        resource_id: ResourceId,
    ) -> impl Future<Output = EtlResult<Option<ListenerResource>>> + Send;

    fn store_listener(
        &self,
        resource: ListenerResource,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
