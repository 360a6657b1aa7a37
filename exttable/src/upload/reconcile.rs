use std::future::Future;

use tracing::debug;

use crate::error::EtlResult;

/// Brings the destination catalog up to date after a table was created.
pub trait CatalogReconciler {
    /// Diffs the catalog against the destination and applies only the change for `table_name`.
    ///
    /// Returns the number of applied differences.
    fn reconcile_table(&self, table_name: &str) -> impl Future<Output = EtlResult<usize>> + Send;
}

/// Reconciler for destinations without a separate catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReconciler;

impl CatalogReconciler for NoopReconciler {
    async fn reconcile_table(&self, table_name: &str) -> EtlResult<usize> {
        debug!(table_name, "no catalog to reconcile");

        Ok(0)
    }
}
