use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::{EXTERNAL_ID_COLUMN, LOAD_STATE_COLUMN, LOAD_TIMESTAMP_COLUMN};
use crate::store::staging::base::{
    StagingStore, UpsertOutcome, key_positions, matching_key, normalized_key,
};
use crate::types::{
    Cell, DataType, ExternalTableDescriptor, LoadState, PendingRow, RowId, TableId, TableRow,
};

/// Schema holding the staging tables and the per-table views.
const STAGING_SCHEMA: &str = "exttable";

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn view_name(store_name: &str) -> String {
    format!("{STAGING_SCHEMA}.{}", quote_identifier(store_name))
}

/// Postgres type a staged value of `data_type` is read back as.
fn column_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Text | DataType::Geographic => "text",
        DataType::Integer => "integer",
        DataType::BigInteger => "bigint",
        DataType::Decimal => "numeric",
        DataType::Float => "double precision",
        DataType::Boolean => "boolean",
        DataType::DateTime => "timestamptz",
        DataType::Guid => "uuid",
    }
}

/// View exposing the staged rows of `table` as a relation named after its store.
///
/// Cross-store inserts address a store by name and select the mapped target columns and the
/// load state, so every mapped column is unpacked from the JSONB row by its mapping position.
fn staging_view_statement(table: &ExternalTableDescriptor, store_name: &str) -> String {
    let mut columns = vec![
        format!("row_id as {}", quote_identifier(EXTERNAL_ID_COLUMN)),
        format!("load_state as {}", quote_identifier(LOAD_STATE_COLUMN)),
        format!("loaded_at as {}", quote_identifier(LOAD_TIMESTAMP_COLUMN)),
    ];
    columns.extend(
        table
            .field_mappings
            .iter()
            .enumerate()
            .map(|(position, mapping)| {
                format!(
                    "(row_values -> {position} ->> 'value')::{} as {}",
                    column_type(mapping.source.data_type),
                    quote_identifier(&mapping.target.name)
                )
            }),
    );

    format!(
        "create view {} as select {} from {STAGING_SCHEMA}.staged_rows where table_id = {}",
        view_name(store_name),
        columns.join(", "),
        table.id.into_inner()
    )
}

/// Staging store persisted in the `exttable` schema of a Postgres database.
///
/// Every store is a row of `exttable.staging_stores` holding the lowest id issued so far, and its
/// rows live in `exttable.staged_rows` with their normalized key values kept as JSONB for
/// matching, see [`matching_key`]. A view named after the store exposes the rows with one column
/// per mapping for uploads. Writes for one table take a transaction-scoped advisory lock on the
/// table id, so id allocation stays serialized even across processes.
#[derive(Debug, Clone)]
pub struct PostgresStagingStore {
    pool: PgPool,
}

impl PostgresStagingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Starts a write transaction for `table`, returning it with the current id floor.
    async fn begin_write(
        &self,
        table: &ExternalTableDescriptor,
    ) -> EtlResult<(Transaction<'static, Postgres>, i64)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("select pg_advisory_xact_lock($1)")
            .bind(table.id.into_inner())
            .execute(&mut *tx)
            .await?;

        let floor: Option<i64> = sqlx::query_scalar(
            "select min_row_id from exttable.staging_stores where table_id = $1 for update",
        )
        .bind(table.id.into_inner())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(floor) = floor else {
            bail!(
                ErrorKind::StagingStoreMissing,
                "Staging store does not exist",
                format!("no staging store for table '{}' ({})", table.name, table.id)
            );
        };

        Ok((tx, floor))
    }

    async fn insert_row(
        tx: &mut Transaction<'static, Postgres>,
        table_id: TableId,
        id: RowId,
        loaded_at: DateTime<Utc>,
        key: &[Cell],
        row: &TableRow,
    ) -> EtlResult<()> {
        sqlx::query(
            r#"
            insert into exttable.staged_rows
                (table_id, row_id, load_state, loaded_at, key_values, row_values)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(table_id.into_inner())
        .bind(id.0)
        .bind(LoadState::Pending.as_i32())
        .bind(loaded_at)
        .bind(Json(key))
        .bind(Json(&row.values))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn commit_floor(
        mut tx: Transaction<'static, Postgres>,
        table_id: TableId,
        floor: i64,
    ) -> EtlResult<()> {
        sqlx::query("update exttable.staging_stores set min_row_id = $2 where table_id = $1")
            .bind(table_id.into_inner())
            .bind(floor)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

impl StagingStore for PostgresStagingStore {
    async fn create_store(&self, table: &ExternalTableDescriptor) -> EtlResult<()> {
        let store_name = self.get_store_name(table.id);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            insert into exttable.staging_stores (table_id, store_name)
            values ($1, $2)
            on conflict (table_id) do nothing
            "#,
        )
        .bind(table.id.into_inner())
        .bind(&store_name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            let view = staging_view_statement(table, &store_name);
            sqlx::query(&view).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        if result.rows_affected() > 0 {
            info!(table_id = %table.id, table_name = %table.name, "created staging store");
        }

        Ok(())
    }

    async fn store_exists(&self, table_id: TableId) -> EtlResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "select exists(select 1 from exttable.staging_stores where table_id = $1)",
        )
        .bind(table_id.into_inner())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get_row_count(&self, table: &ExternalTableDescriptor) -> EtlResult<u64> {
        let count: i64 =
            sqlx::query_scalar("select count(*) from exttable.staged_rows where table_id = $1")
                .bind(table.id.into_inner())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn add_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<Vec<RowId>> {
        let positions = key_positions(table);
        let (mut tx, base) = self.begin_write(table).await?;

        let mut floor = base;
        let mut added = Vec::with_capacity(rows.len());
        for pending in &rows {
            let id = RowId(base + pending.provisional_id.min(-1));
            floor = floor.min(id.0);

            let key = normalized_key(&pending.row.project(&positions));
            Self::insert_row(&mut tx, table.id, id, loaded_at, &key, &pending.row).await?;
            added.push(id);
        }

        Self::commit_floor(tx, table.id, floor).await?;
        debug!(table_id = %table.id, rows = added.len(), "staged rows");

        Ok(added)
    }

    async fn upsert_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<UpsertOutcome> {
        let positions = key_positions(table);
        let (mut tx, base) = self.begin_write(table).await?;

        let mut floor = base;
        let mut outcome = UpsertOutcome::default();
        for pending in &rows {
            let key = normalized_key(&pending.row.project(&positions));

            let existing: Option<i64> = match matching_key(&key) {
                Some(lookup) => {
                    sqlx::query_scalar(
                        r#"
                        update exttable.staged_rows
                        set row_values = $3, loaded_at = $4, load_state = $5
                        where table_id = $1 and key_values = $2
                        returning row_id
                        "#,
                    )
                    .bind(table.id.into_inner())
                    .bind(Json(&lookup))
                    .bind(Json(&pending.row.values))
                    .bind(loaded_at)
                    .bind(LoadState::Pending.as_i32())
                    .fetch_optional(&mut *tx)
                    .await?
                }
                None => None,
            };

            match existing {
                Some(id) => {
                    let id = RowId(id);
                    if !outcome.added.contains(&id) && !outcome.updated.contains(&id) {
                        outcome.updated.push(id);
                    }
                }
                None => {
                    let id = RowId(base + pending.provisional_id.min(-1));
                    floor = floor.min(id.0);

                    Self::insert_row(&mut tx, table.id, id, loaded_at, &key, &pending.row).await?;
                    outcome.added.push(id);
                }
            }
        }

        Self::commit_floor(tx, table.id, floor).await?;
        debug!(
            table_id = %table.id,
            added = outcome.added.len(),
            updated = outcome.updated.len(),
            "upserted rows"
        );

        Ok(outcome)
    }

    async fn delete_rows(
        &self,
        table: &ExternalTableDescriptor,
        key_rows: Vec<TableRow>,
    ) -> EtlResult<Vec<RowId>> {
        let (mut tx, floor) = self.begin_write(table).await?;

        let mut deleted = Vec::new();
        for key_row in &key_rows {
            let Some(key) = matching_key(&key_row.values) else {
                continue;
            };

            let ids: Vec<i64> = sqlx::query_scalar(
                r#"
                delete from exttable.staged_rows
                where table_id = $1 and key_values = $2
                returning row_id
                "#,
            )
            .bind(table.id.into_inner())
            .bind(Json(&key))
            .fetch_all(&mut *tx)
            .await?;

            deleted.extend(ids.into_iter().map(RowId));
        }

        Self::commit_floor(tx, table.id, floor).await?;
        debug!(table_id = %table.id, rows = deleted.len(), "deleted staged rows");

        Ok(deleted)
    }

    async fn delete_store(&self, table_id: TableId) -> EtlResult<()> {
        let drop_view = format!(
            "drop view if exists {}",
            view_name(&self.get_store_name(table_id))
        );
        let mut tx = self.pool.begin().await?;

        sqlx::query(&drop_view).execute(&mut *tx).await?;
        // Staged rows go with the store through the cascading foreign key.
        sqlx::query("delete from exttable.staging_stores where table_id = $1")
            .bind(table_id.into_inner())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(%table_id, "dropped staging store");

        Ok(())
    }
}
