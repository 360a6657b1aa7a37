use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use exttable_config::shared::SchedulerConfig;
use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::metrics::{
    EXTTABLE_AUTO_UPDATE_DURATION_SECONDS, EXTTABLE_AUTO_UPDATE_RUNS_TOTAL, OUTCOME_FAILURE,
    OUTCOME_LABEL, OUTCOME_SUCCESS,
};
use crate::scheduler::history::{ExecutionHistory, RunStatus, TaskRunDetail};
use crate::scheduler::task::{AutoUpdateParams, AutoUpdateTask};
use crate::types::TableId;

/// Scheduling state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleState {
    Unscheduled,
    /// Waiting for the interval to elapse.
    Delayed,
    Running,
}

/// Registry entry of a delayed table. Dropping it cancels the delay.
#[derive(Debug)]
struct ScheduledTaskHandle {
    generation: u64,
    _cancel_tx: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Registry {
    handles: HashMap<TableId, ScheduledTaskHandle>,
    running: HashSet<TableId>,
    next_generation: u64,
    shutting_down: bool,
}

impl Registry {
    /// Registers a fresh handle for `table_id`, returning its generation and cancel receiver.
    fn insert_handle(&mut self, table_id: TableId) -> (u64, oneshot::Receiver<()>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.next_generation += 1;
        let generation = self.next_generation;

        self.handles.insert(
            table_id,
            ScheduledTaskHandle {
                generation,
                _cancel_tx: cancel_tx,
            },
        );

        (generation, cancel_rx)
    }

    fn owns_handle(&self, table_id: TableId, generation: u64) -> bool {
        self.handles
            .get(&table_id)
            .is_some_and(|handle| handle.generation == generation)
    }
}

#[derive(Debug)]
struct Shared<T, H> {
    task: T,
    history: H,
    config: SchedulerConfig,
    registry: Mutex<Registry>,
    /// Signaled whenever a run finishes.
    idle: Notify,
    shutdown_rx: ShutdownRx,
}

impl<T, H> Shared<T, H> {
    fn is_shutting_down(&self, registry: &Registry) -> bool {
        registry.shutting_down || self.shutdown_rx.has_changed().unwrap_or(true)
    }
}

/// Schedules recurring auto-update runs, one independent loop per table.
///
/// A table is `Delayed` while its loop waits for the interval and `Running` while the run
/// executes. At most one handle exists per table, and none while the table runs: the loop
/// removes its handle when the run starts and registers a new one once the next run is
/// scheduled. Failed or panicking runs are recorded and the table is scheduled again; a table
/// that is no longer eligible after a run is not.
///
/// Dropping the host's shutdown sender counts as a shutdown signal.
#[derive(Debug)]
pub struct AutoUpdateScheduler<T, H> {
    shared: Arc<Shared<T, H>>,
}

impl<T, H> Clone for AutoUpdateScheduler<T, H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, H> AutoUpdateScheduler<T, H>
where
    T: AutoUpdateTask + Send + Sync + 'static,
    H: ExecutionHistory + Send + Sync + 'static,
{
    pub fn new(task: T, history: H, config: SchedulerConfig, shutdown_rx: ShutdownRx) -> Self {
        Self {
            shared: Arc::new(Shared {
                task,
                history,
                config,
                registry: Mutex::new(Registry::default()),
                idle: Notify::new(),
                shutdown_rx,
            }),
        }
    }

    /// Queues every eligible candidate table, returning how many were scheduled.
    ///
    /// A failure for one table is logged and does not prevent scheduling the others.
    pub async fn initialise(&self) -> EtlResult<usize> {
        let candidates = self.shared.task.list_candidates().await?;

        let mut scheduled = 0;
        for table_id in candidates {
            match self.queue(table_id).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(%table_id, error = %err, "failed to schedule auto-update");
                }
            }
        }

        info!(scheduled, "auto-update scheduler initialised");

        Ok(scheduled)
    }

    /// Schedules the next run of `table_id` after its interval.
    ///
    /// Returns `false` without scheduling when the table is not eligible, already delayed or
    /// currently running.
    pub async fn queue(&self, table_id: TableId) -> EtlResult<bool> {
        let Some(params) = self.shared.task.check(table_id).await? else {
            debug!(%table_id, "table not eligible for auto-update");
            return Ok(false);
        };

        let (generation, cancel_rx) = {
            let mut registry = self.shared.registry.lock().await;
            if self.shared.is_shutting_down(&registry)
                || registry.handles.contains_key(&table_id)
                || registry.running.contains(&table_id)
            {
                return Ok(false);
            }

            registry.insert_handle(table_id)
        };

        debug!(
            %table_id,
            interval_minutes = params.interval_minutes,
            "scheduled auto-update"
        );
        tokio::spawn(run_loop(self.shared.clone(), params, generation, cancel_rx));

        Ok(true)
    }

    /// Replaces the pending run of `table_id` after a configuration change.
    ///
    /// A running table keeps its run; the change is picked up when it is scheduled again.
    pub async fn reschedule(&self, table_id: TableId) -> EtlResult<bool> {
        self.cancel(table_id).await;
        self.queue(table_id).await
    }

    /// Cancels the pending run of `table_id`, returning whether one existed.
    pub async fn cancel(&self, table_id: TableId) -> bool {
        let mut registry = self.shared.registry.lock().await;
        registry.handles.remove(&table_id).is_some()
    }

    pub async fn state(&self, table_id: TableId) -> ScheduleState {
        let registry = self.shared.registry.lock().await;
        if registry.running.contains(&table_id) {
            ScheduleState::Running
        } else if registry.handles.contains_key(&table_id) {
            ScheduleState::Delayed
        } else {
            ScheduleState::Unscheduled
        }
    }

    /// Cancels every pending run and waits for the running ones to finish.
    pub async fn shutdown(&self) {
        {
            let mut registry = self.shared.registry.lock().await;
            registry.shutting_down = true;
            registry.handles.clear();
        }

        loop {
            let idle = self.shared.idle.notified();
            if self.shared.registry.lock().await.running.is_empty() {
                break;
            }
            idle.await;
        }

        info!("auto-update scheduler stopped");
    }
}

async fn run_loop<T, H>(
    shared: Arc<Shared<T, H>>,
    mut params: AutoUpdateParams,
    mut generation: u64,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    T: AutoUpdateTask + Send + Sync + 'static,
    H: ExecutionHistory + Send + Sync + 'static,
{
    let table_id = params.table_id;
    let mut shutdown_rx = shared.shutdown_rx.clone();

    loop {
        let delay = shared.config.delay_for(params.interval_minutes);
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                let mut registry = shared.registry.lock().await;
                if registry.owns_handle(table_id, generation) {
                    registry.handles.remove(&table_id);
                }
                debug!(%table_id, "auto-update stopped by shutdown");
                return;
            }
            _ = &mut cancel_rx => {
                debug!(%table_id, "auto-update cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        {
            let mut registry = shared.registry.lock().await;
            if !registry.owns_handle(table_id, generation) {
                return;
            }
            registry.handles.remove(&table_id);
            registry.running.insert(table_id);
        }

        execute(&shared, &params).await;

        let next = match shared.task.check(table_id).await {
            Ok(next) => next,
            Err(err) => {
                warn!(%table_id, error = %err, "eligibility check failed, keeping previous schedule");
                Some(params.clone())
            }
        };

        let mut registry = shared.registry.lock().await;
        registry.running.remove(&table_id);
        shared.idle.notify_waiters();

        if shared.is_shutting_down(&registry) {
            return;
        }
        let Some(next) = next else {
            info!(%table_id, "table no longer eligible, auto-update stopped");
            return;
        };
        if registry.handles.contains_key(&table_id) {
            debug!(%table_id, "auto-update superseded by a newer schedule");
            return;
        }

        (generation, cancel_rx) = registry.insert_handle(table_id);
        params = next;
    }
}

/// Runs one auto-update, recording its outcome. Never fails: errors and panics end up in the
/// execution history.
async fn execute<T, H>(shared: &Shared<T, H>, scheduled: &AutoUpdateParams)
where
    T: AutoUpdateTask + Send + Sync,
    H: ExecutionHistory + Send + Sync,
{
    let table_id = scheduled.table_id;

    // Configuration may have changed during the delay.
    let params = match shared.task.check(table_id).await {
        Ok(Some(params)) => params,
        Ok(None) => {
            info!(%table_id, "table became ineligible during its delay, run skipped");
            return;
        }
        Err(err) => {
            let now = Utc::now();
            record(shared, scheduled, now, Err(err)).await;
            return;
        }
    };

    let started_at = Utc::now();
    let started = Instant::now();

    let result = match AssertUnwindSafe(shared.task.run(&params))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(etl_error!(
            ErrorKind::SchedulerTaskPanic,
            "Auto-update run panicked",
            panic_message(panic.as_ref())
        )),
    };

    let outcome = if result.is_ok() {
        OUTCOME_SUCCESS
    } else {
        OUTCOME_FAILURE
    };
    counter!(EXTTABLE_AUTO_UPDATE_RUNS_TOTAL, OUTCOME_LABEL => outcome).increment(1);
    histogram!(EXTTABLE_AUTO_UPDATE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    record(shared, &params, started_at, result).await;
}

async fn record<T, H>(
    shared: &Shared<T, H>,
    params: &AutoUpdateParams,
    started_at: chrono::DateTime<Utc>,
    result: EtlResult<usize>,
) where
    H: ExecutionHistory + Sync,
{
    let (status, records, error) = match result {
        Ok(records) => (RunStatus::StoppedSuccessful, records, None),
        Err(err) => {
            error!(table_id = %params.table_id, error = %err, "auto-update run failed");
            (RunStatus::StoppedFailed, 0, Some(err.to_string()))
        }
    };

    let detail = TaskRunDetail {
        table_id: params.table_id,
        table_name: params.table_name.clone(),
        listener_name: params.listener_name.clone(),
        status,
        started_at,
        finished_at: Utc::now(),
        records,
        error,
    };

    if let Err(err) = shared.history.record_run(detail).await {
        warn!(table_id = %params.table_id, error = %err, "failed to record auto-update run");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
