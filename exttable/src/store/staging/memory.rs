use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::store::staging::base::{StagingStore, UpsertOutcome, key_positions, matching_key};
use crate::types::{
    Cell, ExternalTableDescriptor, LoadState, PendingRow, RowId, StagedRow, TableId, TableRow,
};

#[derive(Debug, Default)]
struct TableStore {
    rows: BTreeMap<RowId, StagedRow>,
    /// Lowest id handed out so far; the next row gets a lower one.
    floor: i64,
}

impl TableStore {
    /// Maps a batch-local provisional id onto a durable id below every id issued before `base`.
    fn allocate(&mut self, base: i64, provisional_id: i64) -> RowId {
        let id = base + provisional_id.min(-1);
        self.floor = self.floor.min(id);
        RowId(id)
    }

    /// Ids of the staged rows whose key equals `key`, a key built by [`matching_key`].
    fn matching(&self, positions: &[usize], key: &[Cell]) -> Vec<RowId> {
        self.rows
            .values()
            .filter(|staged| matching_key(&staged.row.project(positions)).as_deref() == Some(key))
            .map(|staged| staged.id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableId, TableStore>,
}

impl Inner {
    fn table_mut(&mut self, table: &ExternalTableDescriptor) -> EtlResult<&mut TableStore> {
        match self.tables.get_mut(&table.id) {
            Some(store) => Ok(store),
            None => bail!(
                ErrorKind::StagingStoreMissing,
                "Staging store does not exist",
                format!("no staging store for table '{}' ({})", table.name, table.id)
            ),
        }
    }
}

/// Staging store kept in process memory, for tests and development.
#[derive(Debug, Clone, Default)]
pub struct MemoryStagingStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the staged rows of a table, newest first.
    pub async fn staged_rows(&self, table_id: TableId) -> Vec<StagedRow> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(&table_id)
            .map(|store| store.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sets the load state of staged rows, as a destination loader would after a push.
    pub async fn set_load_state(&self, table_id: TableId, ids: &[RowId], state: LoadState) {
        let mut inner = self.inner.lock().await;
        if let Some(store) = inner.tables.get_mut(&table_id) {
            for id in ids {
                if let Some(staged) = store.rows.get_mut(id) {
                    staged.load_state = state;
                }
            }
        }
    }
}

impl StagingStore for MemoryStagingStore {
    async fn create_store(&self, table: &ExternalTableDescriptor) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table.id).or_insert_with(|| {
            debug!(table_id = %table.id, "creating in-memory staging store");
            TableStore::default()
        });

        Ok(())
    }

    async fn store_exists(&self, table_id: TableId) -> EtlResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.contains_key(&table_id))
    }

    async fn get_row_count(&self, table: &ExternalTableDescriptor) -> EtlResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .get(&table.id)
            .map(|store| store.rows.len() as u64)
            .unwrap_or(0))
    }

    async fn add_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<Vec<RowId>> {
        let mut inner = self.inner.lock().await;
        let store = inner.table_mut(table)?;

        let base = store.floor;
        let mut added = Vec::with_capacity(rows.len());
        for pending in rows {
            let id = store.allocate(base, pending.provisional_id);
            store.rows.insert(
                id,
                StagedRow {
                    id,
                    load_state: LoadState::Pending,
                    loaded_at,
                    row: pending.row,
                },
            );
            added.push(id);
        }

        Ok(added)
    }

    async fn upsert_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<UpsertOutcome> {
        let positions = key_positions(table);
        let mut inner = self.inner.lock().await;
        let store = inner.table_mut(table)?;

        let base = store.floor;
        let mut outcome = UpsertOutcome::default();
        for pending in rows {
            let existing = matching_key(&pending.row.project(&positions))
                .and_then(|key| store.matching(&positions, &key).first().copied());
            match existing {
                Some(id) => {
                    if let Some(staged) = store.rows.get_mut(&id) {
                        staged.row = pending.row;
                        staged.loaded_at = loaded_at;
                        staged.load_state = LoadState::Pending;
                    }
                    if !outcome.added.contains(&id) && !outcome.updated.contains(&id) {
                        outcome.updated.push(id);
                    }
                }
                None => {
                    let id = store.allocate(base, pending.provisional_id);
                    store.rows.insert(
                        id,
                        StagedRow {
                            id,
                            load_state: LoadState::Pending,
                            loaded_at,
                            row: pending.row,
                        },
                    );
                    outcome.added.push(id);
                }
            }
        }

        Ok(outcome)
    }

    async fn delete_rows(
        &self,
        table: &ExternalTableDescriptor,
        key_rows: Vec<TableRow>,
    ) -> EtlResult<Vec<RowId>> {
        let positions = key_positions(table);
        let mut inner = self.inner.lock().await;
        let store = inner.table_mut(table)?;

        let mut deleted = Vec::new();
        for key_row in key_rows {
            let Some(key) = matching_key(&key_row.values) else {
                continue;
            };

            for id in store.matching(&positions, &key) {
                store.rows.remove(&id);
                deleted.push(id);
            }
        }

        Ok(deleted)
    }

    async fn delete_store(&self, table_id: TableId) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.tables.remove(&table_id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::test_utils::{column, key_column, table};
    use crate::types::{DataType, TableType};

    fn pending(provisional_id: i64, values: Vec<Cell>) -> PendingRow {
        PendingRow {
            provisional_id,
            row: TableRow::new(values),
        }
    }

    fn people() -> ExternalTableDescriptor {
        table(
            TableType::CampaignUniqueKeys,
            vec![key_column("id", DataType::Integer), column("name", DataType::Text)],
        )
    }

    #[tokio::test]
    async fn writes_require_an_existing_store() {
        let store = MemoryStagingStore::new();
        let descriptor = people();

        let err = store
            .add_rows(&descriptor, vec![pending(-1, vec![Cell::I64(1)])], Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StagingStoreMissing);
        assert_eq!(store.get_row_count(&descriptor).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ids_keep_decreasing_across_batches() {
        let store = MemoryStagingStore::new();
        let descriptor = people();
        store.create_store(&descriptor).await.unwrap();

        let first = store
            .add_rows(
                &descriptor,
                vec![pending(-1, vec![Cell::I64(1)]), pending(-2, vec![Cell::I64(2)])],
                Utc::now(),
            )
            .await
            .unwrap();
        let second = store
            .add_rows(&descriptor, vec![pending(-1, vec![Cell::I64(3)])], Utc::now())
            .await
            .unwrap();

        assert_eq!(first, vec![RowId(-1), RowId(-2)]);
        assert_eq!(second, vec![RowId(-3)]);
        assert_eq!(store.get_store_name(descriptor.id), "ExtTab_1");
    }

    #[tokio::test]
    async fn upsert_reports_disjoint_sets() {
        let store = MemoryStagingStore::new();
        let descriptor = people();
        store.create_store(&descriptor).await.unwrap();

        let row = |seq: i64, id: i64, name: &str| {
            pending(seq, vec![Cell::I64(id), Cell::String(name.into())])
        };
        let first = store
            .upsert_rows(&descriptor, vec![row(-1, 1, "a"), row(-2, 1, "b")], Utc::now())
            .await
            .unwrap();
        assert_eq!(first.added, vec![RowId(-1)]);
        assert!(first.updated.is_empty());

        let second = store
            .upsert_rows(&descriptor, vec![row(-1, 1, "c"), row(-2, 2, "d")], Utc::now())
            .await
            .unwrap();
        assert_eq!(second.updated, vec![RowId(-1)]);
        assert_eq!(second.added, vec![RowId(-3)]);

        let rows = store.staged_rows(descriptor.id).await;
        let updated = rows.iter().find(|r| r.id == RowId(-1)).unwrap();
        assert_eq!(updated.row.values[1], Cell::String("c".into()));
    }

    #[tokio::test]
    async fn delete_matches_on_key_values() {
        let store = MemoryStagingStore::new();
        let descriptor = people();
        store.create_store(&descriptor).await.unwrap();
        store
            .add_rows(
                &descriptor,
                vec![
                    pending(-1, vec![Cell::I64(1), Cell::Null]),
                    pending(-2, vec![Cell::I64(2), Cell::Null]),
                ],
                Utc::now(),
            )
            .await
            .unwrap();

        let deleted = store
            .delete_rows(&descriptor, vec![TableRow::new(vec![Cell::I64(2)])])
            .await
            .unwrap();

        assert_eq!(deleted, vec![RowId(-2)]);
        assert_eq!(store.get_row_count(&descriptor).await.unwrap(), 1);

        store.delete_store(descriptor.id).await.unwrap();
        assert!(!store.store_exists(descriptor.id).await.unwrap());
    }

    #[tokio::test]
    async fn decimal_keys_match_across_scales_and_null_keys_never_match() {
        let store = MemoryStagingStore::new();
        let descriptor = table(
            TableType::CampaignUniqueKeys,
            vec![key_column("price", DataType::Decimal), column("name", DataType::Text)],
        );
        store.create_store(&descriptor).await.unwrap();

        let price = |value: &str| Cell::Numeric(value.parse().unwrap());
        let first = store
            .upsert_rows(
                &descriptor,
                vec![
                    pending(-1, vec![price("12.50"), Cell::String("a".into())]),
                    pending(-2, vec![Cell::Null, Cell::String("b".into())]),
                ],
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(first.added, vec![RowId(-1), RowId(-2)]);

        let second = store
            .upsert_rows(
                &descriptor,
                vec![
                    pending(-1, vec![price("12.5"), Cell::String("c".into())]),
                    pending(-2, vec![Cell::Null, Cell::String("d".into())]),
                ],
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(second.updated, vec![RowId(-1)]);
        assert_eq!(second.added, vec![RowId(-4)]);

        let deleted = store
            .delete_rows(
                &descriptor,
                vec![TableRow::new(vec![Cell::Null]), TableRow::new(vec![price("12.500")])],
            )
            .await
            .unwrap();
        assert_eq!(deleted, vec![RowId(-1)]);
        assert_eq!(store.get_row_count(&descriptor).await.unwrap(), 2);
    }
}
