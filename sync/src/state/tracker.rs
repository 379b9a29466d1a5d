use tokio::sync::mpsc;
use tracing::debug;

use crate::state::status::{RunState, StreamStatusValue};
use crate::state::store::StreamStatusStateStore;
use crate::types::{
    ConnectorStreamStatus, Message, ReplicationContext, StateMessage, StateScope, StreamKey,
    StreamStatusTrace, TraceMessage,
};

/// Emitted whenever a stream's run state actually changes.
///
/// At most one event is published per observed change; writes that resolve to the
/// current state stay silent.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatusUpdateEvent {
    pub stream: StreamKey,
    pub run_state: RunState,
    pub context: ReplicationContext,
    pub value: StreamStatusValue,
}

/// Routes protocol messages into the status store and publishes run-state changes.
///
/// The tracker is cloned into the stages that observe messages; each stage calls
/// [`StreamStatusTracker::track`] for the message kinds it owns, so no two stages
/// ever drive the same logic path concurrently.
#[derive(Debug, Clone)]
pub struct StreamStatusTracker {
    store: StreamStatusStateStore,
    context: ReplicationContext,
    events: mpsc::UnboundedSender<StreamStatusUpdateEvent>,
}

impl StreamStatusTracker {
    pub fn new(
        store: StreamStatusStateStore,
        context: ReplicationContext,
        events: mpsc::UnboundedSender<StreamStatusUpdateEvent>,
    ) -> Self {
        Self {
            store,
            context,
            events,
        }
    }

    pub fn store(&self) -> &StreamStatusStateStore {
        &self.store
    }

    /// Applies a message to the status store.
    ///
    /// Messages with a resolvable stream key follow the per-stream path; global state
    /// messages follow the global path; everything else is ignored.
    pub async fn track(&self, message: &Message) {
        match message.stream_key() {
            Some(key) => self.track_stream(&key, message).await,
            None => {
                if let Message::State(state) = message {
                    if state.scope == StateScope::Global {
                        self.track_global(state).await;
                    }
                }
            }
        }
    }

    async fn track_stream(&self, key: &StreamKey, message: &Message) {
        match message {
            Message::Record(_) => {
                // A record on a throttled stream means the quota recovered. Checked
                // before the run-state write, which overwrites the throttled state.
                if self.store.is_rate_limited(key).await {
                    self.store.set_metadata(key, None).await;
                }
                self.set_run_state_and_publish(key, RunState::Running).await;
                self.store.mark_stream_not_empty(key).await;
            }
            Message::State(state) => {
                if self.store.is_stream_complete(key, state.id).await {
                    self.set_run_state_and_publish(key, RunState::Complete)
                        .await;
                } else {
                    self.store.set_latest_state_id(key, state.id).await;
                }
            }
            Message::Trace(TraceMessage::StreamStatus(status)) => {
                self.track_stream_status(key, status).await;
            }
            _ => {}
        }
    }

    async fn track_stream_status(&self, key: &StreamKey, status: &StreamStatusTrace) {
        match status.status {
            ConnectorStreamStatus::Started | ConnectorStreamStatus::Running => {
                if let Some(metadata) = status.rate_limited {
                    self.set_run_state_and_publish(key, RunState::RateLimited)
                        .await;
                    self.store.set_metadata(key, Some(metadata)).await;
                } else {
                    self.set_run_state_and_publish(key, RunState::Running).await;
                }
            }
            // The source finishing a stream is not the stream being complete; the
            // destination still has to acknowledge the final checkpoint.
            ConnectorStreamStatus::Complete => {
                self.store.mark_source_complete(key).await;
            }
            ConnectorStreamStatus::Incomplete => {
                self.set_run_state_and_publish(key, RunState::Incomplete)
                    .await;
            }
        }
    }

    async fn track_global(&self, state: &StateMessage) {
        self.store.set_latest_global_state_id(state.id).await;

        if self.store.is_global_complete(state.id).await {
            for (key, value) in self.store.entries().await {
                // The predicate already guarantees this, but completion is only ever
                // applied to streams the source actually finished.
                if value.source_complete {
                    self.set_run_state_and_publish(&key, RunState::Complete)
                        .await;
                }
            }
        }
    }

    /// Builds the terminal stream status messages still owed to the destination.
    ///
    /// On a clean source exit every stream the source finished gets a COMPLETE
    /// status; otherwise every tracked stream gets an INCOMPLETE one.
    pub async fn finalize(&self, source_exited_cleanly: bool) -> Vec<Message> {
        let mut entries = self.store.entries().await;
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        entries
            .into_iter()
            .filter_map(|(key, value)| {
                if source_exited_cleanly {
                    value
                        .source_complete
                        .then(|| Message::stream_status(&key, ConnectorStreamStatus::Complete))
                } else {
                    Some(Message::stream_status(
                        &key,
                        ConnectorStreamStatus::Incomplete,
                    ))
                }
            })
            .collect()
    }

    async fn set_run_state_and_publish(&self, key: &StreamKey, incoming: RunState) {
        let before = self.store.get(key).await.and_then(|value| value.run_state);
        let value = self.store.set_run_state(key, incoming).await;

        if let Some(run_state) = value.run_state {
            if before != Some(run_state) {
                debug!(stream = %key, ?run_state, "stream run state changed");

                // Fire and forget: a missing consumer must never stall tracking.
                let _ = self.events.send(StreamStatusUpdateEvent {
                    stream: key.clone(),
                    run_state,
                    context: self.context,
                    value,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use crate::types::{LogLevel, LogMessage, RateLimitedMetadata};

    use super::*;

    fn context() -> ReplicationContext {
        ReplicationContext::new(Uuid::new_v4(), 1, 0)
    }

    fn tracker() -> (
        StreamStatusTracker,
        mpsc::UnboundedReceiver<StreamStatusUpdateEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            StreamStatusTracker::new(StreamStatusStateStore::new(), context(), tx),
            rx,
        )
    }

    fn rate_limited_status(stream: &StreamKey, quota_reset: i64) -> Message {
        Message::Trace(TraceMessage::StreamStatus(StreamStatusTrace {
            stream: stream.clone(),
            status: ConnectorStreamStatus::Running,
            rate_limited: Some(RateLimitedMetadata { quota_reset }),
        }))
    }

    #[tokio::test]
    async fn test_record_sets_running_and_publishes_once() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");

        tracker.track(&Message::record(&users, json!({}), 0)).await;
        tracker.track(&Message::record(&users, json!({}), 1)).await;

        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::Running));
        assert!(!value.stream_empty);

        let event = events.try_recv().unwrap();
        assert_eq!(event.stream, users);
        assert_eq!(event.run_state, RunState::Running);
        // The second record resolved to the same state, so no second event.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_record_clears_rate_limit_metadata() {
        let (tracker, _events) = tracker();
        let users = StreamKey::unnamespaced("users");

        tracker.track(&rate_limited_status(&users, 123)).await;
        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::RateLimited));
        assert_eq!(value.metadata, Some(RateLimitedMetadata { quota_reset: 123 }));

        tracker.track(&Message::record(&users, json!({}), 0)).await;
        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::Running));
        assert_eq!(value.metadata, None);
    }

    #[tokio::test]
    async fn test_stream_state_records_latest_id_while_incomplete() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");

        tracker
            .track(&Message::stream_state(&users, 4, json!({})))
            .await;

        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.latest_state_id, Some(4));
        assert_eq!(value.run_state, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_state_completes_on_final_acknowledgement() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");

        // Source emits its last checkpoint and finishes the stream.
        tracker
            .track(&Message::stream_state(&users, 4, json!({})))
            .await;
        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;

        // Destination acknowledges the same checkpoint.
        tracker
            .track(&Message::stream_state(&users, 4, json!({})))
            .await;

        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::Complete));

        let event = events.try_recv().unwrap();
        assert_eq!(event.run_state, RunState::Complete);
    }

    #[tokio::test]
    async fn test_source_complete_alone_does_not_complete_stream() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;

        let value = tracker.store().get(&users).await.unwrap();
        assert!(value.source_complete);
        assert_eq!(value.run_state, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_started_and_incomplete_statuses() {
        let (tracker, _events) = tracker();
        let users = StreamKey::unnamespaced("users");
        let orders = StreamKey::unnamespaced("orders");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Started,
            ))
            .await;
        tracker
            .track(&Message::stream_status(
                &orders,
                ConnectorStreamStatus::Incomplete,
            ))
            .await;

        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::Running));

        let value = tracker.store().get(&orders).await.unwrap();
        assert_eq!(value.run_state, Some(RunState::Incomplete));
    }

    #[tokio::test]
    async fn test_global_state_completes_all_finished_streams() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");
        let orders = StreamKey::unnamespaced("orders");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;
        tracker
            .track(&Message::stream_status(
                &orders,
                ConnectorStreamStatus::Complete,
            ))
            .await;

        // Source emits the global checkpoint, destination acknowledges it.
        tracker.track(&Message::global_state(9, json!({}))).await;
        tracker.track(&Message::global_state(9, json!({}))).await;

        for key in [&users, &orders] {
            let value = tracker.store().get(key).await.unwrap();
            assert_eq!(value.run_state, Some(RunState::Complete));
        }

        let mut completed = vec![
            events.try_recv().unwrap().stream,
            events.try_recv().unwrap().stream,
        ];
        completed.sort();
        assert_eq!(completed, vec![orders, users]);
    }

    #[tokio::test]
    async fn test_global_state_waits_for_all_streams() {
        let (tracker, mut events) = tracker();
        let users = StreamKey::unnamespaced("users");
        let orders = StreamKey::unnamespaced("orders");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;
        tracker
            .track(&Message::stream_status(
                &orders,
                ConnectorStreamStatus::Started,
            ))
            .await;
        // Drop the RUNNING event from the started stream.
        let _ = events.try_recv();

        tracker.track(&Message::global_state(3, json!({}))).await;

        let value = tracker.store().get(&users).await.unwrap();
        assert_eq!(value.run_state, None);
        assert_eq!(tracker.store().get_latest_global_state_id().await, 3);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrelated_messages_are_ignored() {
        let (tracker, mut events) = tracker();

        tracker
            .track(&Message::Log(LogMessage {
                level: LogLevel::Info,
                message: "noise".to_string(),
            }))
            .await;

        assert!(tracker.store().entries().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finalize_after_clean_exit() {
        let (tracker, _events) = tracker();
        let users = StreamKey::unnamespaced("users");
        let orders = StreamKey::unnamespaced("orders");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;
        tracker
            .track(&Message::stream_status(
                &orders,
                ConnectorStreamStatus::Started,
            ))
            .await;

        let messages = tracker.finalize(true).await;
        assert_eq!(
            messages,
            vec![Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete
            )]
        );
    }

    #[tokio::test]
    async fn test_finalize_after_failed_exit() {
        let (tracker, _events) = tracker();
        let users = StreamKey::unnamespaced("users");
        let orders = StreamKey::unnamespaced("orders");

        tracker
            .track(&Message::stream_status(
                &users,
                ConnectorStreamStatus::Complete,
            ))
            .await;
        tracker
            .track(&Message::stream_status(
                &orders,
                ConnectorStreamStatus::Started,
            ))
            .await;

        let messages = tracker.finalize(false).await;
        assert_eq!(
            messages,
            vec![
                Message::stream_status(&orders, ConnectorStreamStatus::Incomplete),
                Message::stream_status(&users, ConnectorStreamStatus::Incomplete),
            ]
        );
    }
}
