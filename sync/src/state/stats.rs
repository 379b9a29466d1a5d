use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::{Message, StreamKey, StreamSyncStats};

/// Progress counters for the attempt, shared across stages.
///
/// Byte counts are estimated from the serialized size of each record payload.
#[derive(Debug, Clone, Default)]
pub struct SyncStatsTracker {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, StreamCounters>,
    source_state_count: u64,
    destination_state_count: u64,
}

#[derive(Debug, Default)]
struct StreamCounters {
    records: u64,
    bytes: u64,
}

impl SyncStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a message observed on the source side.
    ///
    /// Returns the total number of records seen so far, so callers can emit
    /// periodic progress logs without taking the lock twice.
    pub fn accept_from_source(&self, message: &Message) -> u64 {
        let mut inner = self.lock();
        match message {
            Message::Record(record) => {
                let counters = inner.streams.entry(record.stream_key()).or_default();
                counters.records += 1;
                counters.bytes += record.data.to_string().len() as u64;
            }
            Message::State(_) => inner.source_state_count += 1,
            _ => {}
        }
        inner.streams.values().map(|counters| counters.records).sum()
    }

    /// Counts a message observed on the destination side.
    pub fn accept_from_destination(&self, message: &Message) {
        if let Message::State(_) = message {
            self.lock().destination_state_count += 1;
        }
    }

    pub fn total_records(&self) -> u64 {
        self.lock()
            .streams
            .values()
            .map(|counters| counters.records)
            .sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock()
            .streams
            .values()
            .map(|counters| counters.bytes)
            .sum()
    }

    pub fn source_state_count(&self) -> u64 {
        self.lock().source_state_count
    }

    pub fn destination_state_count(&self) -> u64 {
        self.lock().destination_state_count
    }

    /// Returns per-stream counters, ordered by stream key.
    pub fn per_stream(&self) -> Vec<StreamSyncStats> {
        let inner = self.lock();
        let mut stats = inner
            .streams
            .iter()
            .map(|(key, counters)| StreamSyncStats {
                stream: key.clone(),
                records_emitted: counters.records,
                bytes_emitted: counters.bytes,
            })
            .collect::<Vec<_>>();
        stats.sort_by(|a, b| a.stream.cmp(&b.stream));
        stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
