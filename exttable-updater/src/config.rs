use exttable_config::load_config;
use exttable_config::shared::UpdaterConfig;

use crate::error::{UpdaterError, UpdaterResult};

/// Loads the service configuration from `./configuration` and validates it.
pub fn load_updater_config() -> UpdaterResult<UpdaterConfig> {
    let config = load_config::<UpdaterConfig>().map_err(UpdaterError::config)?;
    config.validate().map_err(UpdaterError::config)?;

    Ok(config)
}
