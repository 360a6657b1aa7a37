use std::time::Duration;

use exttable_config::shared::{PgConnectionConfig, PgSessionOptions};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Maximum number of connections shared by the descriptor and staging stores.
const MAX_POOL_CONNECTIONS: u32 = 4;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a lazily connected pool for the Postgres stores.
///
/// No connection is opened until the first query. Auto-update runs are minutes apart, so idle
/// connections are closed instead of being held between runs.
pub fn create_store_pool(config: &PgConnectionConfig) -> PgPool {
    let options = config.connect_options(&PgSessionOptions::STORES);

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}
