use std::future::Future;

use chrono::Utc;
use exttable_config::shared::UploadConfig;
use metrics::counter;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::{
    ERROR_KIND_LABEL, EXTTABLE_RECONCILIATION_FAILURES_TOTAL, EXTTABLE_ROWS_UPLOADED_TOTAL,
    TABLE_ID_LABEL,
};
use crate::store::staging::StagingStore;
use crate::types::ExternalTableDescriptor;
use crate::upload::connection::AnalyticConnection;
use crate::upload::reconcile::CatalogReconciler;
use crate::upload::statements::{
    clear_table_statement, create_table_statement, staging_insert_statement,
};

/// Pushes the staged rows of an analysis table downstream after a fetch.
pub trait TableUploader {
    /// Uploads the table and returns the number of rows copied.
    fn upload(
        &self,
        table: &mut ExternalTableDescriptor,
    ) -> impl Future<Output = EtlResult<u64>> + Send;
}

/// Uploader used when no analytic destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpload;

impl TableUploader for NoUpload {
    async fn upload(&self, table: &mut ExternalTableDescriptor) -> EtlResult<u64> {
        debug!(table_id = %table.id, "no analytic destination configured, skipping upload");

        Ok(0)
    }
}

/// Copies staged rows into the analytic destination table of a descriptor.
///
/// A missing destination table is created from the field mappings; an existing one is cleared
/// first unless the destination provider replaces the full contents on insert.
#[derive(Debug, Clone)]
pub struct UploadSync<S, A, R> {
    store: S,
    connection: A,
    reconciler: R,
    config: UploadConfig,
}

impl<S, A, R> UploadSync<S, A, R>
where
    S: StagingStore + Sync,
    A: AnalyticConnection + Sync,
    R: CatalogReconciler + Sync,
{
    pub fn new(store: S, connection: A, reconciler: R, config: UploadConfig) -> Self {
        Self {
            store,
            connection,
            reconciler,
            config,
        }
    }

    /// Drains the staged rows of `table` into its destination and stamps the last run instant.
    ///
    /// Catalog reconciliation after creating the destination table is best effort: a failure is
    /// logged and counted, and the upload still succeeds. The catalog may then miss the new table
    /// until it is reconciled by hand.
    pub async fn drain(&self, table: &mut ExternalTableDescriptor) -> EtlResult<u64> {
        if table.table_type.is_campaign() {
            bail!(
                ErrorKind::InvalidOperation,
                "Campaign tables cannot be uploaded",
                format!("table '{}' is bound to campaigns", table.name)
            );
        }

        if !self.store.store_exists(table.id).await? {
            bail!(
                ErrorKind::StagingStoreMissing,
                "Staging store does not exist",
                format!("table '{}' has nothing staged to upload", table.name)
            );
        }

        let target = table.target_table.clone();
        let created = if self.connection.table_exists(&target).await? {
            if self.config.is_push_complete() {
                debug!(table = %target, "destination reloads on insert, skipping clear");
            } else {
                let statement = clear_table_statement(&self.config.clear_table_template, &target);
                self.connection.execute(&statement).await?;
            }
            false
        } else {
            self.connection
                .execute(&create_table_statement(table))
                .await?;
            info!(table_id = %table.id, table = %target, "created destination table");
            true
        };

        let store_name = self.store.get_store_name(table.id);
        let insert = staging_insert_statement(table, &self.config.staging_source, &store_name);
        let rows = self.connection.execute(&insert).await?;
        counter!(EXTTABLE_ROWS_UPLOADED_TOTAL, TABLE_ID_LABEL => table.id.to_string())
            .increment(rows);

        if created {
            match self.reconciler.reconcile_table(&target).await {
                Ok(changes) => {
                    debug!(table = %target, changes, "reconciled destination catalog");
                }
                Err(err) => {
                    error!(
                        table_id = %table.id,
                        table = %target,
                        error = %err,
                        "catalog reconciliation failed, destination catalog may be stale"
                    );
                    counter!(
                        EXTTABLE_RECONCILIATION_FAILURES_TOTAL,
                        ERROR_KIND_LABEL => format!("{:?}", err.kind())
                    )
                    .increment(1);
                }
            }
        }

        table.last_run_at = Some(Utc::now());
        info!(table_id = %table.id, table = %target, rows, "uploaded staged rows");

        Ok(rows)
    }
}

impl<S, A, R> TableUploader for UploadSync<S, A, R>
where
    S: StagingStore + Sync,
    A: AnalyticConnection + Sync,
    R: CatalogReconciler + Sync,
{
    async fn upload(&self, table: &mut ExternalTableDescriptor) -> EtlResult<u64> {
        self.drain(table).await
    }
}

#[cfg(test)]
mod tests {
    use exttable_config::shared::{
        DEFAULT_CLEAR_TABLE_TEMPLATE, DEFAULT_PUSH_COMPLETE_PROVIDER, StagingSourceConfig,
    };

    use super::*;
    use crate::store::staging::MemoryStagingStore;
    use crate::test_utils::{column, key_column, table};
    use crate::types::{DataType, TableType};
    use crate::upload::{MemoryAnalyticConnection, NoopReconciler};

    fn config(destination_provider: &str) -> UploadConfig {
        UploadConfig {
            staging_source: StagingSourceConfig {
                provider: "OLEDB".to_owned(),
                connection_string: "Server=meta".to_owned(),
                database: "Metadata".to_owned(),
                factory: "SqlServer".to_owned(),
            },
            destination_provider: destination_provider.to_owned(),
            push_complete_provider: DEFAULT_PUSH_COMPLETE_PROVIDER.to_owned(),
            clear_table_template: DEFAULT_CLEAR_TABLE_TEMPLATE.to_owned(),
        }
    }

    async fn staged_table(store: &MemoryStagingStore, table_type: TableType) -> ExternalTableDescriptor {
        let descriptor = table(
            table_type,
            vec![key_column("id", DataType::Integer), column("name", DataType::Text)],
        );
        store.create_store(&descriptor).await.unwrap();
        descriptor
    }

    #[tokio::test]
    async fn existing_table_is_cleared_before_insert() {
        let store = MemoryStagingStore::new();
        let connection = MemoryAnalyticConnection::new();
        connection.add_table("People").await;
        connection.set_insert_row_count(3).await;
        let sync = UploadSync::new(store.clone(), connection.clone(), NoopReconciler, config("SqlServer"));
        let mut descriptor = staged_table(&store, TableType::Analysis).await;

        let rows = sync.drain(&mut descriptor).await.unwrap();

        assert_eq!(rows, 3);
        let statements = connection.statements().await;
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "DELETE FROM [People]");
        assert!(statements[1].starts_with("INSERT INTO [People] SELECT [id], [name] FROM"));
        assert!(descriptor.last_run_at.is_some());
    }

    #[tokio::test]
    async fn push_complete_destination_is_not_cleared() {
        let store = MemoryStagingStore::new();
        let connection = MemoryAnalyticConnection::new();
        connection.add_table("People").await;
        let sync = UploadSync::new(
            store.clone(),
            connection.clone(),
            NoopReconciler,
            config(DEFAULT_PUSH_COMPLETE_PROVIDER),
        );
        let mut descriptor = staged_table(&store, TableType::Analysis).await;

        sync.drain(&mut descriptor).await.unwrap();

        let statements = connection.statements().await;
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("INSERT INTO"));
    }

    #[tokio::test]
    async fn campaign_tables_are_rejected() {
        let store = MemoryStagingStore::new();
        let connection = MemoryAnalyticConnection::new();
        let sync = UploadSync::new(store.clone(), connection.clone(), NoopReconciler, config("SqlServer"));
        let mut descriptor = staged_table(&store, TableType::CampaignUniqueKeys).await;

        let err = sync.drain(&mut descriptor).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(connection.statements().await.is_empty());
        assert!(descriptor.last_run_at.is_none());
    }

    #[tokio::test]
    async fn failed_insert_leaves_last_run_untouched() {
        let store = MemoryStagingStore::new();
        let connection = MemoryAnalyticConnection::new();
        connection.fail_statements_starting_with("INSERT").await;
        let sync = UploadSync::new(store.clone(), connection.clone(), NoopReconciler, config("SqlServer"));
        let mut descriptor = staged_table(&store, TableType::Analysis).await;

        let err = sync.drain(&mut descriptor).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
        assert!(descriptor.last_run_at.is_none());
    }
}
