mod message;
mod summary;

pub use message::*;
pub use summary::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a pipeline.
pub type PipelineId = u64;

/// Identity of the replication attempt a pipeline is running for.
///
/// Attached to stream status update events so consumers can correlate them with the
/// connection and attempt they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationContext {
    pub connection_id: Uuid,
    pub job_id: u64,
    pub attempt_number: u32,
}

impl ReplicationContext {
    pub fn new(connection_id: Uuid, job_id: u64, attempt_number: u32) -> Self {
        Self {
            connection_id,
            job_id,
            attempt_number,
        }
    }
}

/// Everything a single replication attempt needs to run.
#[derive(Debug, Clone)]
pub struct ReplicationInput {
    pub context: ReplicationContext,
    /// Identifier under which the control plane tracks this attempt's liveness.
    pub workload_id: String,
    /// Opaque configuration handed to the source connector at start.
    pub source_config: serde_json::Value,
    /// Opaque configuration handed to the destination connector at start.
    pub destination_config: serde_json::Value,
    /// Directory the connectors may use as scratch space.
    pub job_root: std::path::PathBuf,
}
