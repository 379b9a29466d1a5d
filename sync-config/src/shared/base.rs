use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Queue capacities cannot be zero.
    #[error("`source_queue_size` and `destination_queue_size` cannot be zero")]
    QueueSizeZero,
    /// The heartbeat interval cannot be zero.
    #[error("`heartbeat.interval_ms` cannot be zero")]
    HeartbeatIntervalZero,
}
