use serde::Deserialize;

use crate::Config;
use crate::shared::{
    ListenerConfig, NotificationConfig, SchedulerConfig, StoreConfig, UploadConfig,
    ValidationError,
};

/// Top-level configuration of the auto-update service.
///
/// This intentionally does not implement [`serde::Serialize`] so connection secrets are not
/// leaked into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Upload settings; analytic tables are only staged when absent.
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()?;
        self.scheduler.validate()?;
        self.listener.validate()?;
        self.notifications.validate()?;

        if let Some(upload) = &self.upload {
            upload.validate()?;
        }

        Ok(())
    }
}

impl Config for UpdaterConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
