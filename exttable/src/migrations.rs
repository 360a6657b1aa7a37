use exttable_config::shared::{PgConnectionConfig, PgSessionOptions};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

use crate::error::EtlResult;

/// Schema holding the descriptor and staging store tables.
pub const EXTTABLE_SCHEMA: &str = "exttable";

/// Applies the store migrations inside the `exttable` schema.
///
/// The `_sqlx_migrations` bookkeeping table is created in the same schema, keeping `public`
/// untouched.
pub async fn apply_exttable_migrations(connection_config: &PgConnectionConfig) -> EtlResult<()> {
    let options = connection_config.connect_options(&PgSessionOptions::MIGRATIONS);

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists exttable;").await?;
                conn.execute("set search_path = 'exttable';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!(schema = EXTTABLE_SCHEMA, "applying store migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("store migrations applied");

    Ok(())
}
