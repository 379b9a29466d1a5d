use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::state::status::{RunState, StreamStatusValue, resolve_run_state};
use crate::types::{RateLimitedMetadata, StreamKey};

/// Shared store of per-stream status values plus the global checkpoint watermark.
///
/// The store is the single authority the tracker reads and writes; all mutating
/// operations return the updated value so callers can observe the effect of the
/// write atomically. Cloning the store is cheap and all clones share state.
#[derive(Debug, Clone)]
pub struct StreamStatusStateStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, StreamStatusValue>,
    latest_global_state_id: u64,
}

impl StreamStatusStateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub async fn get(&self, key: &StreamKey) -> Option<StreamStatusValue> {
        let inner = self.inner.lock().await;
        inner.streams.get(key).cloned()
    }

    pub async fn set(&self, key: StreamKey, value: StreamStatusValue) {
        let mut inner = self.inner.lock().await;
        inner.streams.insert(key, value);
    }

    /// Returns a snapshot of all tracked streams.
    pub async fn entries(&self) -> Vec<(StreamKey, StreamStatusValue)> {
        let inner = self.inner.lock().await;
        inner
            .streams
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Applies `incoming` to the stream's run state through the transition table.
    ///
    /// Creates the entry if the stream was not tracked yet.
    pub async fn set_run_state(&self, key: &StreamKey, incoming: RunState) -> StreamStatusValue {
        let mut inner = self.inner.lock().await;
        let value = inner.streams.entry(key.clone()).or_default();
        value.run_state = Some(resolve_run_state(value.run_state, incoming));
        value.clone()
    }

    /// Records a checkpoint id for the stream, keeping the highest id seen.
    ///
    /// Writes with an id lower than or equal to the current one are no-ops that
    /// return the unchanged value.
    pub async fn set_latest_state_id(&self, key: &StreamKey, id: u64) -> StreamStatusValue {
        let mut inner = self.inner.lock().await;
        let value = inner.streams.entry(key.clone()).or_default();
        if value.latest_state_id.is_none_or(|current| current < id) {
            value.latest_state_id = Some(id);
        }
        value.clone()
    }

    pub async fn set_metadata(
        &self,
        key: &StreamKey,
        metadata: Option<RateLimitedMetadata>,
    ) -> StreamStatusValue {
        let mut inner = self.inner.lock().await;
        let value = inner.streams.entry(key.clone()).or_default();
        value.metadata = metadata;
        value.clone()
    }

    /// Marks that the source emitted a terminal COMPLETE status for the stream.
    ///
    /// Idempotent, and never affects other streams.
    pub async fn mark_source_complete(&self, key: &StreamKey) -> StreamStatusValue {
        let mut inner = self.inner.lock().await;
        let value = inner.streams.entry(key.clone()).or_default();
        value.source_complete = true;
        value.clone()
    }

    /// Marks that at least one record was seen for the stream.
    pub async fn mark_stream_not_empty(&self, key: &StreamKey) -> StreamStatusValue {
        let mut inner = self.inner.lock().await;
        let value = inner.streams.entry(key.clone()).or_default();
        value.stream_empty = false;
        value.clone()
    }

    pub async fn is_rate_limited(&self, key: &StreamKey) -> bool {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(key)
            .is_some_and(|value| value.run_state == Some(RunState::RateLimited))
    }

    /// Advances the global checkpoint watermark, keeping the highest id seen.
    pub async fn set_latest_global_state_id(&self, id: u64) -> u64 {
        let mut inner = self.inner.lock().await;
        if id > inner.latest_global_state_id {
            inner.latest_global_state_id = id;
        }
        inner.latest_global_state_id
    }

    pub async fn get_latest_global_state_id(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.latest_global_state_id
    }

    /// Whether the stream has fully flushed through the destination.
    ///
    /// True only when the source finished the stream and the acknowledged id matches
    /// the latest tracked id exactly. An id ahead of or behind the tracked one means
    /// messages are still in flight.
    pub async fn is_stream_complete(&self, key: &StreamKey, id: u64) -> bool {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(key)
            .is_some_and(|value| value.source_complete && value.latest_state_id == Some(id))
    }

    /// Whether a global checkpoint acknowledgement completes the whole connection:
    /// the id matches the watermark exactly and every tracked stream finished on the
    /// source side.
    pub async fn is_global_complete(&self, id: u64) -> bool {
        let inner = self.inner.lock().await;
        inner.latest_global_state_id == id
            && inner.streams.values().all(|value| value.source_complete)
    }
}

impl Default for StreamStatusStateStore {
    fn default() -> Self {
        Self::new()
    }
}
