//! External-table auto-update service binary.
//!
//! Polls the listeners feeding external tables on each table's interval, stages the new events
//! and uploads analysis tables to the configured destination.

use exttable_config::shared::UpdaterConfig;
use exttable_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_updater_config;
use crate::core::start_updater_with_config;
use crate::error::{UpdaterError, UpdaterResult};

mod config;
mod core;
mod error;

fn main() -> UpdaterResult<()> {
    let updater_config = load_updater_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(UpdaterError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(updater_config))?;

    Ok(())
}

async fn async_main(updater_config: UpdaterConfig) -> UpdaterResult<()> {
    if let Err(err) = start_updater_with_config(updater_config).await {
        error!("{err}");
        eprint!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}
