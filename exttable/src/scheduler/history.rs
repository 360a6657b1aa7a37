use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::EtlResult;
use crate::types::TableId;

/// Final state of an auto-update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    StoppedSuccessful,
    StoppedFailed,
}

/// Record of one auto-update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunDetail {
    pub table_id: TableId,
    pub table_name: String,
    pub listener_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Rows staged by the run, zero when it failed.
    pub records: usize,
    /// Full error report of a failed run.
    pub error: Option<String>,
}

/// Destination of auto-update run records.
pub trait ExecutionHistory {
    fn record_run(&self, detail: TaskRunDetail) -> impl Future<Output = EtlResult<()>> + Send;
}

/// History writing each run as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExecutionHistory;

impl ExecutionHistory for TracingExecutionHistory {
    async fn record_run(&self, detail: TaskRunDetail) -> EtlResult<()> {
        let elapsed_ms = (detail.finished_at - detail.started_at).num_milliseconds();

        match detail.status {
            RunStatus::StoppedSuccessful => info!(
                table_id = %detail.table_id,
                table_name = %detail.table_name,
                listener = %detail.listener_name,
                records = detail.records,
                elapsed_ms,
                "auto-update run finished"
            ),
            RunStatus::StoppedFailed => error!(
                table_id = %detail.table_id,
                table_name = %detail.table_name,
                listener = %detail.listener_name,
                elapsed_ms,
                error = detail.error.as_deref().unwrap_or_default(),
                "auto-update run failed"
            ),
        }

        Ok(())
    }
}

/// History kept in memory, in completion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionHistory {
    runs: Arc<Mutex<Vec<TaskRunDetail>>>,
}

impl MemoryExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<TaskRunDetail> {
        self.runs.lock().await.clone()
    }

    pub async fn runs_for(&self, table_id: TableId) -> Vec<TaskRunDetail> {
        self.runs
            .lock()
            .await
            .iter()
            .filter(|run| run.table_id == table_id)
            .cloned()
            .collect()
    }
}

impl ExecutionHistory for MemoryExecutionHistory {
    async fn record_run(&self, detail: TaskRunDetail) -> EtlResult<()> {
        self.runs.lock().await.push(detail);

        Ok(())
    }
}
