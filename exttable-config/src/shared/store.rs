use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Backend holding table descriptors, listener resources and staged rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StoreConfig {
    /// Process-local storage, lost on restart.
    Memory,
    Postgres { connection: PgConnectionConfig },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Postgres { connection } => connection.validate(),
        }
    }
}
