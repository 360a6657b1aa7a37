use std::future::Future;

use chrono::Utc;
use tracing::{debug, info};

use crate::engine::UpsertEngine;
use crate::error::EtlResult;
use crate::listener::ListenerClient;
use crate::store::descriptor::DescriptorStore;
use crate::store::staging::StagingStore;
use crate::types::{
    ExternalTableDescriptor, ListenerResource, OperationKind, ResourceId, TableId, TableType,
};
use crate::upload::TableUploader;

/// What the scheduler needs to know to queue the next run of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoUpdateParams {
    pub table_id: TableId,
    pub table_name: String,
    pub listener_id: ResourceId,
    pub listener_name: String,
    pub interval_minutes: u32,
}

/// Work scheduled by [`crate::scheduler::AutoUpdateScheduler`].
pub trait AutoUpdateTask {
    /// Tables to consider when the scheduler starts.
    fn list_candidates(&self) -> impl Future<Output = EtlResult<Vec<TableId>>> + Send;

    /// Returns the run parameters of `table_id`, or `None` when it is not eligible for
    /// auto-update.
    fn check(
        &self,
        table_id: TableId,
    ) -> impl Future<Output = EtlResult<Option<AutoUpdateParams>>> + Send;

    /// Runs one update and returns the number of records staged.
    fn run(&self, params: &AutoUpdateParams) -> impl Future<Output = EtlResult<usize>> + Send;
}

/// Auto-update fetching new events from a table's listener.
///
/// Each run stages the events after the stored watermark, records the new watermark and, for
/// analysis tables that received rows, uploads the table.
#[derive(Debug, Clone)]
pub struct ListenerAutoUpdate<D, S, U> {
    descriptors: D,
    engine: UpsertEngine<S>,
    client: ListenerClient,
    uploader: U,
}

impl<D, S, U> ListenerAutoUpdate<D, S, U>
where
    D: DescriptorStore + Sync,
    S: StagingStore + Clone + Send + Sync,
    U: TableUploader + Sync,
{
    pub fn new(descriptors: D, engine: UpsertEngine<S>, client: ListenerClient, uploader: U) -> Self {
        Self {
            descriptors,
            engine,
            client,
            uploader,
        }
    }

    /// Loads the listener feeding `table` when both can currently take part in auto-update.
    async fn pollable_listener(
        &self,
        table: &ExternalTableDescriptor,
    ) -> EtlResult<Option<ListenerResource>> {
        if !table.state.is_usable() {
            return Ok(None);
        }

        let Some(source) = table.auto_update_source.filter(ResourceId::is_assigned) else {
            return Ok(None);
        };

        let listener = self.descriptors.get_listener(source).await?;
        Ok(listener.filter(ListenerResource::is_pollable))
    }
}

impl<D, S, U> AutoUpdateTask for ListenerAutoUpdate<D, S, U>
where
    D: DescriptorStore + Sync,
    S: StagingStore + Clone + Send + Sync,
    U: TableUploader + Sync,
{
    async fn list_candidates(&self) -> EtlResult<Vec<TableId>> {
        self.descriptors.list_table_ids().await
    }

    async fn check(&self, table_id: TableId) -> EtlResult<Option<AutoUpdateParams>> {
        let Some(table) = self.descriptors.get_table(table_id).await? else {
            return Ok(None);
        };

        let Some(interval_minutes) = table.auto_update_interval_minutes.filter(|i| *i > 0) else {
            return Ok(None);
        };

        let Some(listener) = self.pollable_listener(&table).await? else {
            return Ok(None);
        };

        Ok(Some(AutoUpdateParams {
            table_id,
            table_name: table.name,
            listener_id: listener.id,
            listener_name: listener.name,
            interval_minutes,
        }))
    }

    async fn run(&self, params: &AutoUpdateParams) -> EtlResult<usize> {
        let Some(mut table) = self.descriptors.get_table(params.table_id).await? else {
            debug!(table_id = %params.table_id, "table removed before its run");
            return Ok(0);
        };

        let Some(listener) = self.pollable_listener(&table).await? else {
            debug!(table_id = %table.id, "listener no longer usable, nothing fetched");
            return Ok(0);
        };

        info!(
            table_id = %table.id,
            table_name = %table.name,
            listener = %listener.name,
            "auto-updating table from listener"
        );

        let watermark = table.last_fetched_event_id.unwrap_or(0);
        let payload = self.client.fetch(&listener, watermark).await?;

        let outcome = self
            .engine
            .apply_batch(&mut table, &payload, OperationKind::Add)
            .await?;

        // The descriptor may have been edited during the fetch, so only progress is written back.
        let ran_at = Utc::now();
        table.last_run_at = Some(ran_at);
        if !self
            .descriptors
            .record_progress(table.id, table.last_fetched_event_id, ran_at)
            .await?
        {
            debug!(table_id = %table.id, "table removed during its run, progress dropped");
            return Ok(outcome.processed);
        }

        if outcome.processed > 0 && table.table_type == TableType::Analysis {
            self.uploader.upload(&mut table).await?;
            if let Some(uploaded_at) = table.last_run_at.filter(|at| *at != ran_at) {
                self.descriptors
                    .record_progress(table.id, None, uploaded_at)
                    .await?;
            }
        }

        Ok(outcome.processed)
    }
}
