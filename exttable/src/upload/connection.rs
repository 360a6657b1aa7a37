use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// SQL connection to the analytic destination.
pub trait AnalyticConnection {
    fn table_exists(&self, table_name: &str) -> impl Future<Output = EtlResult<bool>> + Send;

    /// Executes a statement, returning the number of affected rows.
    fn execute(&self, statement: &str) -> impl Future<Output = EtlResult<u64>> + Send;
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashSet<String>,
    statements: Vec<String>,
    insert_row_count: u64,
    failing_prefix: Option<String>,
}

/// Destination that records statements instead of running them.
///
/// `CREATE TABLE [name]` registers the table, so later existence checks see it.
#[derive(Debug, Clone, Default)]
pub struct MemoryAnalyticConnection {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAnalyticConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_table(&self, table_name: &str) {
        self.inner
            .lock()
            .await
            .tables
            .insert(table_name.to_lowercase());
    }

    /// Sets the row count reported by `INSERT` statements.
    pub async fn set_insert_row_count(&self, rows: u64) {
        self.inner.lock().await.insert_row_count = rows;
    }

    /// Makes every statement starting with `prefix` fail.
    pub async fn fail_statements_starting_with(&self, prefix: &str) {
        self.inner.lock().await.failing_prefix = Some(prefix.to_owned());
    }

    pub async fn statements(&self) -> Vec<String> {
        self.inner.lock().await.statements.clone()
    }
}

impl AnalyticConnection for MemoryAnalyticConnection {
    async fn table_exists(&self, table_name: &str) -> EtlResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.contains(&table_name.to_lowercase()))
    }

    async fn execute(&self, statement: &str) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;

        if let Some(prefix) = &inner.failing_prefix
            && statement.starts_with(prefix.as_str())
        {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Destination statement failed",
                statement
            );
        }
        inner.statements.push(statement.to_owned());

        if let Some(rest) = statement.strip_prefix("CREATE TABLE [")
            && let Some((name, _)) = rest.split_once(']')
        {
            inner.tables.insert(name.to_lowercase());
            return Ok(0);
        }

        if statement.starts_with("INSERT INTO") {
            return Ok(inner.insert_row_count);
        }

        Ok(0)
    }
}
