use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("`scheduler.interval_unit_ms` cannot be zero")]
    IntervalUnitZero,
    #[error("`listener.request_timeout_secs` cannot be zero")]
    RequestTimeoutZero,
    #[error("`listener.max_events_per_call` cannot be zero")]
    MaxEventsPerCallZero,
    #[error("`notifications.queue_capacity` cannot be zero")]
    QueueCapacityZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    #[error("invalid upload config: {0}")]
    UploadConfig(String),
}
