use serde::{Deserialize, Serialize};

use crate::shared::{HeartbeatConfig, ValidationError};

/// Configuration for a replication pipeline.
///
/// Contains all settings required to run a single replication attempt: queue
/// capacities, connector polling cadence, and liveness thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    pub id: u64,
    /// Capacity of the queue between the source reader and the message processor.
    pub source_queue_size: usize,
    /// Capacity of the queue between the message processor and the destination writer.
    pub destination_queue_size: usize,
    /// Milliseconds to back off when a connector poll returns nothing.
    pub poll_interval_ms: u64,
    /// Heartbeat and idle-timeout settings.
    pub heartbeat: HeartbeatConfig,
}

impl PipelineConfig {
    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_queue_size == 0 || self.destination_queue_size == 0 {
            return Err(ValidationError::QueueSizeZero);
        }

        if self.heartbeat.interval_ms == 0 {
            return Err(ValidationError::HeartbeatIntervalZero);
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            id: 0,
            source_queue_size: 1000,
            destination_queue_size: 1000,
            poll_interval_ms: 10,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}
