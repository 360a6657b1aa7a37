use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// One minute, the unit in which table refresh intervals are expressed.
pub const DEFAULT_INTERVAL_UNIT_MS: u64 = 60_000;

const fn default_interval_unit_ms() -> u64 {
    DEFAULT_INTERVAL_UNIT_MS
}

/// Settings for the auto-update scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Length of one interval unit in milliseconds.
    ///
    /// A table configured with an interval of `n` waits `n * interval_unit_ms` between runs.
    #[serde(default = "default_interval_unit_ms")]
    pub interval_unit_ms: u64,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_unit_ms == 0 {
            return Err(ValidationError::IntervalUnitZero);
        }

        Ok(())
    }

    /// Delay before the next run of a table configured with `interval` units.
    pub fn delay_for(&self, interval: u32) -> Duration {
        Duration::from_millis(self.interval_unit_ms.saturating_mul(u64::from(interval)))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_unit_ms: DEFAULT_INTERVAL_UNIT_MS,
        }
    }
}
