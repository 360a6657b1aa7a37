use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::EtlResult;
use crate::types::{Cell, ExternalTableDescriptor, PendingRow, RowId, TableId, TableRow};

/// Prefix of the per-table staging store name.
pub const STAGING_STORE_PREFIX: &str = "ExtTab_";

/// Ids produced by an upsert. The two lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub added: Vec<RowId>,
    pub updated: Vec<RowId>,
}

/// Durable per-table holding area for transformed rows awaiting upload.
///
/// Rows passed to [`StagingStore::add_rows`] and [`StagingStore::upsert_rows`] carry one value
/// per field mapping, in mapping order. Rows passed to [`StagingStore::delete_rows`] carry only
/// the key mappings, in mapping order. Stores assign durable, strictly decreasing negative ids
/// and stage every written row as pending.
///
/// Implementations must tolerate concurrent calls for different tables. Calls for one table are
/// serialized by the caller.
pub trait StagingStore {
    /// Creates the store for `table` if it does not exist yet.
    fn create_store(
        &self,
        table: &ExternalTableDescriptor,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    fn store_exists(&self, table_id: TableId) -> impl Future<Output = EtlResult<bool>> + Send;

    /// Returns the number of staged rows, zero when the store does not exist.
    fn get_row_count(
        &self,
        table: &ExternalTableDescriptor,
    ) -> impl Future<Output = EtlResult<u64>> + Send;

    /// Returns the name under which the store is addressed by cross-store queries.
    fn get_store_name(&self, table_id: TableId) -> String {
        format!("{STAGING_STORE_PREFIX}{table_id}")
    }

    /// Appends rows without matching existing ones.
    fn add_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> impl Future<Output = EtlResult<Vec<RowId>>> + Send;

    /// Updates rows whose key values match a staged row and inserts the others.
    ///
    /// A key repeated within `rows` updates the row inserted earlier in the same call and is only
    /// reported as added.
    fn upsert_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> impl Future<Output = EtlResult<UpsertOutcome>> + Send;

    /// Deletes every staged row matching one of the key rows.
    fn delete_rows(
        &self,
        table: &ExternalTableDescriptor,
        key_rows: Vec<TableRow>,
    ) -> impl Future<Output = EtlResult<Vec<RowId>>> + Send;

    /// Drops the store and all of its rows.
    fn delete_store(&self, table_id: TableId) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Positions of the key mappings in a full row, in mapping order.
pub fn key_positions(table: &ExternalTableDescriptor) -> Vec<usize> {
    table
        .field_mappings
        .iter()
        .enumerate()
        .filter(|(_, mapping)| mapping.is_key())
        .map(|(index, _)| index)
        .collect()
}

/// Key values in the form stores persist and compare them.
///
/// Decimals are normalized, so `12.50` and `12.5` are the same key.
pub fn normalized_key(values: &[Cell]) -> Vec<Cell> {
    values
        .iter()
        .map(|cell| match cell {
            Cell::Numeric(value) => Cell::Numeric(value.normalized()),
            other => other.clone(),
        })
        .collect()
}

/// Key used to look up staged rows, or `None` when a key value is null.
///
/// A null key value matches no row, not even another null.
pub fn matching_key(values: &[Cell]) -> Option<Vec<Cell>> {
    if values.iter().any(Cell::is_null) {
        return None;
    }

    Some(normalized_key(values))
}
