//! Recurring auto-update of tables fed by remote listeners.

mod auto_update;
mod history;
mod task;

pub use auto_update::{AutoUpdateScheduler, ScheduleState};
pub use history::{
    ExecutionHistory, MemoryExecutionHistory, RunStatus, TaskRunDetail, TracingExecutionHistory,
};
pub use task::{AutoUpdateParams, AutoUpdateTask, ListenerAutoUpdate};
