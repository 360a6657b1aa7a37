use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::store::descriptor::base::DescriptorStore;
use crate::types::{ExternalTableDescriptor, ListenerResource, ResourceId, TableId};

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<TableId, ExternalTableDescriptor>,
    listeners: HashMap<ResourceId, ListenerResource>,
}

/// Descriptor store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDescriptorStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DescriptorStore for MemoryDescriptorStore {
    async fn list_table_ids(&self) -> EtlResult<Vec<TableId>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.keys().copied().collect())
    }

    async fn get_table(&self, table_id: TableId) -> EtlResult<Option<ExternalTableDescriptor>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(&table_id).cloned())
    }

    async fn store_table(&self, table: ExternalTableDescriptor) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table.id, table);

        Ok(())
    }

    async fn record_progress(
        &self,
        table_id: TableId,
        last_fetched_event_id: Option<u64>,
        last_run_at: DateTime<Utc>,
    ) -> EtlResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get_mut(&table_id) else {
            return Ok(false);
        };

        if let Some(event_id) = last_fetched_event_id {
            table.advance_watermark(event_id);
        }
        table.last_run_at = Some(last_run_at);

        Ok(true)
    }

    async fn get_listener(&self, resource_id: ResourceId) -> EtlResult<Option<ListenerResource>> {
        let inner = self.inner.lock().await;
        Ok(inner.listeners.get(&resource_id).cloned())
    }

    async fn store_listener(&self, resource: ListenerResource) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.listeners.insert(resource.id, resource);

        Ok(())
    }
}
