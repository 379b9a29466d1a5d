use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SyncError};
use crate::types::message::StreamKey;

/// Terminal status of a replication attempt.
///
/// Cancellation takes precedence over failure, failure over completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Subsystem a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureOrigin {
    Source,
    Destination,
    Platform,
}

/// A single classified failure captured during an attempt.
///
/// Failures are appended in the order they are observed; the first entry is the
/// primary failure and later entries are secondary (for example close errors during
/// wind-down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub origin: FailureOrigin,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FailureReason {
    pub fn new(origin: FailureOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Classifies a [`SyncError`] into a failure reason based on its kind.
    pub fn from_error(error: &SyncError) -> Self {
        Self {
            origin: origin_of(error.kind()),
            message: error.to_string(),
            detail: error.detail().map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

fn origin_of(kind: ErrorKind) -> FailureOrigin {
    match kind {
        ErrorKind::SourceError | ErrorKind::SourceHeartbeatTimeout => FailureOrigin::Source,
        ErrorKind::DestinationError | ErrorKind::DestinationTimeout => FailureOrigin::Destination,
        _ => FailureOrigin::Platform,
    }
}

/// Record and byte counters for a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSyncStats {
    pub stream: StreamKey,
    pub records_emitted: u64,
    pub bytes_emitted: u64,
}

/// Phase timing captured over the attempt, as epoch milliseconds (0 when a phase
/// never ran).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationTimes {
    pub replication_start: i64,
    pub replication_end: i64,
    pub source_read_start: i64,
    pub source_read_end: i64,
    pub destination_write_start: i64,
    pub destination_write_end: i64,
}

/// Aggregated result of a replication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationAttemptSummary {
    pub status: ReplicationStatus,
    pub records_synced: u64,
    pub bytes_synced: u64,
    pub stream_stats: Vec<StreamSyncStats>,
    pub source_state_messages_emitted: u64,
    pub destination_state_messages_emitted: u64,
    pub times: ReplicationTimes,
}

/// Full output of a replication attempt: the summary plus the ordered failure list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationOutput {
    pub summary: ReplicationAttemptSummary,
    pub failures: Vec<FailureReason>,
}
