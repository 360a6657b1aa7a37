use std::sync::Once;

use exttable_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Set to any value to print logs from tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] std::io::Error),

    #[error("failed to install global tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Hold it for the lifetime of `main`.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a service binary.
///
/// Filtering comes from `RUST_LOG`, defaulting to `info` for the binary and the core library.
/// Production logs are emitted as JSON lines; development logs are human readable.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load().map_err(TracingError::Environment)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(app_name).into());

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let registry = tracing_subscriber::registry().with(filter);
    if environment.is_prod() {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .try_init()?;
    }

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
pub fn init_test_tracing() {
    if std::env::var_os(ENABLE_TEST_TRACING_ENV_NAME).is_none() {
        return;
    }

    TEST_TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "exttable=debug".into());
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

fn default_directives(app_name: &str) -> String {
    let app_target = app_name.replace('-', "_");
    format!("{app_target}=info,exttable=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_names_become_targets() {
        assert_eq!(
            default_directives("exttable-updater"),
            "exttable_updater=info,exttable=info"
        );
    }
}
