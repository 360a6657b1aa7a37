use exttable::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use exttable::engine::UpsertEngine;
use exttable::listener::ListenerClient;
use exttable::migrations::apply_exttable_migrations;
use exttable::notification::{ChangeNotificationQueue, TracingNotificationSink};
use exttable::scheduler::{
    AutoUpdateScheduler, AutoUpdateTask, ListenerAutoUpdate, TracingExecutionHistory,
};
use exttable::store::create_store_pool;
use exttable::store::descriptor::{
    DescriptorStore, MemoryDescriptorStore, PostgresDescriptorStore,
};
use exttable::store::staging::{MemoryStagingStore, PostgresStagingStore, StagingStore};
use exttable::upload::NoUpload;
use exttable_config::shared::{
    ListenerConfig, PgConnectionConfig, SchedulerConfig, StoreConfig, UpdaterConfig,
    UploadConfig,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::UpdaterResult;

/// Starts the auto-update service and runs it until SIGINT or SIGTERM.
///
/// Stores are picked from the configuration. This is more verbose due to static dispatch, but
/// every store and uploader combination stays monomorphized.
pub async fn start_updater_with_config(config: UpdaterConfig) -> UpdaterResult<()> {
    info!("starting auto-update service");

    log_config(&config);

    match config.store.clone() {
        StoreConfig::Memory => {
            warn!("using in-memory stores, staged rows and watermarks are lost on restart");
            run_updater(
                config,
                MemoryDescriptorStore::new(),
                MemoryStagingStore::new(),
            )
            .await?;
        }
        StoreConfig::Postgres { connection } => {
            apply_exttable_migrations(&connection).await?;

            let pool = create_store_pool(&connection);
            run_updater(
                config,
                PostgresDescriptorStore::new(pool.clone()),
                PostgresStagingStore::new(pool),
            )
            .await?;
        }
    }

    info!("auto-update service completed");

    Ok(())
}

fn log_config(config: &UpdaterConfig) {
    if let StoreConfig::Postgres { connection } = &config.store {
        log_pg_connection_config(connection);
    }
    log_scheduler_config(&config.scheduler);
    log_listener_config(&config.listener);
    if let Some(upload) = &config.upload {
        log_upload_config(upload);
    }
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "store postgres connection config",
    );
}

fn log_scheduler_config(config: &SchedulerConfig) {
    debug!(
        interval_unit_ms = config.interval_unit_ms,
        "scheduler config"
    );
}

fn log_listener_config(config: &ListenerConfig) {
    debug!(
        request_timeout_secs = config.request_timeout_secs,
        max_events_per_call = config.max_events_per_call,
        "listener config"
    );
}

fn log_upload_config(config: &UploadConfig) {
    debug!(
        destination_provider = config.destination_provider,
        push_complete = config.is_push_complete(),
        staging_database = config.staging_source.database,
        "upload config"
    );
}

/// Wires the ingestion components over the given stores and runs the scheduler.
async fn run_updater<D, S>(config: UpdaterConfig, descriptors: D, store: S) -> UpdaterResult<()>
where
    D: DescriptorStore + Clone + Send + Sync + 'static,
    S: StagingStore + Clone + Send + Sync + 'static,
{
    let notifications =
        ChangeNotificationQueue::start(TracingNotificationSink, config.notifications.queue_capacity);
    let engine = UpsertEngine::new(store, notifications.clone());
    let client = ListenerClient::new(&config.listener)?;

    let uploader = service_uploader(config.upload.as_ref());
    let task = ListenerAutoUpdate::new(descriptors, engine, client, uploader);
    let result = run_scheduler(task, config.scheduler).await;

    // Flush pending notifications even when the scheduler failed to start.
    if let Err(err) = notifications.shutdown().await {
        warn!(error = %err, "change notifications may have been lost during shutdown");
    }

    result
}

/// Picks the uploader used by the service.
///
/// The service has no driver for the analytic destination, so analysis tables are only staged
/// even when an upload section is configured. Uploads run through `UploadSync` once a real
/// `AnalyticConnection` is available.
fn service_uploader(upload: Option<&UploadConfig>) -> NoUpload {
    match upload {
        Some(upload) => warn!(
            destination_provider = upload.destination_provider,
            "no analytic destination driver available, analysis tables are staged but not uploaded"
        ),
        None => info!("no analytic destination configured, analysis tables are only staged"),
    }

    NoUpload
}

/// Schedules every eligible table and waits for a shutdown signal.
#[tracing::instrument(skip_all)]
async fn run_scheduler<T>(task: T, config: SchedulerConfig) -> UpdaterResult<()>
where
    T: AutoUpdateTask + Send + Sync + 'static,
{
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut wait_rx = shutdown_tx.subscribe();

    let scheduler = AutoUpdateScheduler::new(task, TracingExecutionHistory, config, shutdown_rx);
    let scheduled = scheduler.initialise().await?;
    info!(scheduled, "auto-update scheduler running");

    let shutdown_handle = tokio::spawn(listen_for_shutdown(shutdown_tx));

    // A dropped sender also ends the wait, so a failed signal registration cannot hang here.
    let _ = wait_rx.changed().await;
    scheduler.shutdown().await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    Ok(())
}

/// Waits for SIGINT or SIGTERM and broadcasts the shutdown.
///
/// Runs already in flight finish and persist their watermark before the process exits.
async fn listen_for_shutdown(shutdown_tx: ShutdownTx) {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("sigint (ctrl+c) received, shutting down auto-update service");
                }
                _ = sigterm.recv() => {
                    info!("sigterm received, shutting down auto-update service");
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to register SIGTERM handler, only listening for ctrl+c");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl+c, shutting down");
                return;
            }
            info!("sigint (ctrl+c) received, shutting down auto-update service");
        }
    }

    if let Err(err) = shutdown_tx.shutdown() {
        warn!(error = ?err, "failed to send shutdown signal");
    }
}
