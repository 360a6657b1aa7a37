use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Settings for the change notification queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Number of notifications that may wait for the worker before producers are held back.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::QueueCapacityZero);
        }

        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
