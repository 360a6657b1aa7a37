use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_EVENTS_PER_CALL: u32 = 100;

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_events_per_call() -> u32 {
    DEFAULT_MAX_EVENTS_PER_CALL
}

/// Settings for requests made to remote listener endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Page size requested from the listener on each call.
    #[serde(default = "default_max_events_per_call")]
    pub max_events_per_call: u32,
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::RequestTimeoutZero);
        }

        if self.max_events_per_call == 0 {
            return Err(ValidationError::MaxEventsPerCallZero);
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_events_per_call: DEFAULT_MAX_EVENTS_PER_CALL,
        }
    }
}
