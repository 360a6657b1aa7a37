//! Metric names and labels emitted through the `metrics` facade.
//!
//! No recorder is installed by the library; the host decides where metrics go.

/// Label for the external table id.
pub const TABLE_ID_LABEL: &str = "table_id";

/// Label for the batch operation kind.
pub const OPERATION_LABEL: &str = "operation";

/// Label for the outcome of a run.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the error kind of a failure.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Ingestion

/// Counter of rows processed by applied batches.
pub const EXTTABLE_ROWS_STAGED_TOTAL: &str = "exttable_rows_staged_total";

/// Histogram of batch application duration in seconds.
pub const EXTTABLE_BATCH_DURATION_SECONDS: &str = "exttable_batch_duration_seconds";

// Notifications

/// Counter of change notifications delivered to the sink.
pub const EXTTABLE_NOTIFICATIONS_SENT_TOTAL: &str = "exttable_notifications_sent_total";

/// Counter of change notifications the sink failed to deliver.
pub const EXTTABLE_NOTIFICATIONS_FAILED_TOTAL: &str = "exttable_notifications_failed_total";

// Auto-update

/// Counter of auto-update runs, labeled by outcome.
pub const EXTTABLE_AUTO_UPDATE_RUNS_TOTAL: &str = "exttable_auto_update_runs_total";

/// Histogram of auto-update run duration in seconds.
pub const EXTTABLE_AUTO_UPDATE_DURATION_SECONDS: &str = "exttable_auto_update_duration_seconds";

// Upload

/// Counter of rows inserted into the analytic destination.
pub const EXTTABLE_ROWS_UPLOADED_TOTAL: &str = "exttable_rows_uploaded_total";

/// Counter of catalog reconciliations that failed after a table was created.
pub const EXTTABLE_RECONCILIATION_FAILURES_TOTAL: &str = "exttable_reconciliation_failures_total";

pub const OUTCOME_SUCCESS: &str = "success";

pub const OUTCOME_FAILURE: &str = "failure";
