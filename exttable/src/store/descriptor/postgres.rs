use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

use crate::error::EtlResult;
use crate::store::descriptor::base::DescriptorStore;
use crate::types::{ExternalTableDescriptor, ListenerResource, ResourceId, TableId};

/// Descriptor store persisted as JSONB documents in the `exttable` schema.
#[derive(Debug, Clone)]
pub struct PostgresDescriptorStore {
    pool: PgPool,
}

impl PostgresDescriptorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DescriptorStore for PostgresDescriptorStore {
    async fn list_table_ids(&self) -> EtlResult<Vec<TableId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("select table_id from exttable.external_tables order by table_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(TableId::new).collect())
    }

    async fn get_table(&self, table_id: TableId) -> EtlResult<Option<ExternalTableDescriptor>> {
        let descriptor: Option<Json<ExternalTableDescriptor>> = sqlx::query_scalar(
            "select descriptor from exttable.external_tables where table_id = $1",
        )
        .bind(table_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        Ok(descriptor.map(|Json(descriptor)| descriptor))
    }

    async fn store_table(&self, table: ExternalTableDescriptor) -> EtlResult<()> {
        sqlx::query(
            r#"
            insert into exttable.external_tables (table_id, descriptor)
            values ($1, $2)
            on conflict (table_id)
            do update set descriptor = excluded.descriptor, updated_at = now()
            "#,
        )
        .bind(table.id.into_inner())
        .bind(Json(&table))
        .execute(&self.pool)
        .await?;

        debug!(
            table_id = %table.id,
            watermark = ?table.last_fetched_event_id,
            "stored table descriptor"
        );

        Ok(())
    }

    async fn record_progress(
        &self,
        table_id: TableId,
        last_fetched_event_id: Option<u64>,
        last_run_at: DateTime<Utc>,
    ) -> EtlResult<bool> {
        let mut tx = self.pool.begin().await?;

        let descriptor: Option<Json<ExternalTableDescriptor>> = sqlx::query_scalar(
            "select descriptor from exttable.external_tables where table_id = $1 for update",
        )
        .bind(table_id.into_inner())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut table)) = descriptor else {
            return Ok(false);
        };

        if let Some(event_id) = last_fetched_event_id {
            table.advance_watermark(event_id);
        }
        table.last_run_at = Some(last_run_at);

        sqlx::query(
            r#"
            update exttable.external_tables
            set descriptor = $2, updated_at = now()
            where table_id = $1
            "#,
        )
        .bind(table_id.into_inner())
        .bind(Json(&table))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            %table_id,
            watermark = ?table.last_fetched_event_id,
            "recorded auto-update progress"
        );

        Ok(true)
    }

    async fn get_listener(&self, resource_id: ResourceId) -> EtlResult<Option<ListenerResource>> {
        let resource: Option<Json<ListenerResource>> = sqlx::query_scalar(
            "select resource from exttable.listener_resources where resource_id = $1",
        )
        .bind(resource_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(resource.map(|Json(resource)| resource))
    }

    async fn store_listener(&self, resource: ListenerResource) -> EtlResult<()> {
        sqlx::query(
            r#"
            insert into exttable.listener_resources (resource_id, resource)
            values ($1, $2)
            on conflict (resource_id)
            do update set resource = excluded.resource, updated_at = now()
            "#,
        )
        .bind(resource.id.0)
        .bind(Json(&resource))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
