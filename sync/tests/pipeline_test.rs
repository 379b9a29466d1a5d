use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use sync::connector::base::DestinationConnector;
use sync::connector::memory::{MemoryDestination, MemorySource};
use sync::error::SyncResult;
use sync::mapper::{IdentityMapper, MessageMapper};
use sync::persistence::MemorySyncPersistence;
use sync::pipeline::ReplicationPipeline;
use sync::state::status::RunState;
use sync::types::{
    ConnectorStreamStatus, FailureOrigin, LogLevel, LogMessage, Message, ReplicationContext,
    ReplicationInput, ReplicationStatus, StateScope, StreamKey,
};
use sync::workers::heartbeat::{ControlPlaneClient, HeartbeatApiError};
use sync_config::shared::{HeartbeatConfig, PipelineConfig};
use sync_telemetry::init_test_tracing;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct OkControlPlane;

impl ControlPlaneClient for OkControlPlane {
    async fn send_heartbeat(&self, _workload_id: &str) -> Result<(), HeartbeatApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct GoneControlPlane;

impl ControlPlaneClient for GoneControlPlane {
    async fn send_heartbeat(&self, _workload_id: &str) -> Result<(), HeartbeatApiError> {
        Err(HeartbeatApiError::Gone("workload was archived".to_string()))
    }
}

/// Mapper that drops every record and forwards everything else.
#[derive(Debug, Clone, Copy)]
struct DropRecordsMapper;

impl MessageMapper for DropRecordsMapper {
    fn map(&self, message: Message) -> SyncResult<Option<Message>> {
        match message {
            Message::Record(_) => Ok(None),
            message => Ok(Some(message)),
        }
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        id: 1,
        source_queue_size: 16,
        destination_queue_size: 16,
        poll_interval_ms: 5,
        heartbeat: HeartbeatConfig::default(),
    }
}

fn test_input() -> ReplicationInput {
    ReplicationInput {
        context: ReplicationContext::new(Uuid::new_v4(), 7, 0),
        workload_id: "7_0_sync".to_string(),
        source_config: json!({"cursor": null}),
        destination_config: json!({}),
        job_root: PathBuf::from("/tmp"),
    }
}

fn users_script(users: &StreamKey) -> Vec<Message> {
    vec![
        Message::stream_status(users, ConnectorStreamStatus::Started),
        Message::record(users, json!({"id": 1, "name": "ada"}), 10),
        Message::record(users, json!({"id": 2, "name": "grace"}), 20),
        Message::Log(LogMessage {
            level: LogLevel::Info,
            message: "reading users".to_string(),
        }),
        Message::stream_status(users, ConnectorStreamStatus::Complete),
        Message::stream_state(users, 1, json!({"cursor": 2})),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn records_and_states_reach_destination_in_order() {
    init_test_tracing();

    let users = StreamKey::unnamespaced("users");
    let source = MemorySource::with_messages(users_script(&users));
    let destination = MemoryDestination::new();
    let persistence = MemorySyncPersistence::new();

    let mut pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source.clone(),
        destination.clone(),
        persistence.clone(),
        OkControlPlane,
        IdentityMapper,
    );
    let mut events = pipeline.status_events().unwrap();

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Completed);
    assert!(output.failures.is_empty());
    assert_eq!(output.summary.records_synced, 2);
    assert!(output.summary.bytes_synced > 0);
    assert_eq!(output.summary.source_state_messages_emitted, 1);
    assert_eq!(output.summary.destination_state_messages_emitted, 1);
    assert_eq!(output.summary.stream_stats.len(), 1);
    assert_eq!(output.summary.stream_stats[0].stream, users);
    assert_eq!(output.summary.stream_stats[0].records_emitted, 2);

    // Log and status trace messages stop at the pipeline; the destination sees the
    // records and the state in source order, then the terminal COMPLETE status.
    assert_eq!(
        destination.accepted().await,
        vec![
            Message::record(&users, json!({"id": 1, "name": "ada"}), 10),
            Message::record(&users, json!({"id": 2, "name": "grace"}), 20),
            Message::stream_state(&users, 1, json!({"cursor": 2})),
            Message::stream_status(&users, ConnectorStreamStatus::Complete),
        ]
    );

    // The destination acknowledged the checkpoint, so it was persisted.
    let states = persistence.states().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].scope, StateScope::Stream);
    assert_eq!(states[0].stream, Some(users.clone()));
    assert_eq!(states[0].id, 1);

    // STARTED flips the stream to running; the destination acknowledging the final
    // checkpoint of a source-finished stream completes it.
    let event = events.recv().await.unwrap();
    assert_eq!(event.stream, users);
    assert_eq!(event.run_state, RunState::Running);
    let event = events.recv().await.unwrap();
    assert_eq!(event.run_state, RunState::Complete);
    assert!(events.recv().await.is_none());

    assert!(destination.end_of_input_received().await);
    assert!(source.was_closed().await);
    assert!(destination.was_closed().await);
    assert!(persistence.was_closed().await);

    let times = output.summary.times;
    assert!(times.replication_start > 0);
    assert!(times.replication_end >= times.replication_start);
    assert!(times.source_read_start > 0);
    assert!(times.destination_write_end >= times.destination_write_start);
}

#[tokio::test(flavor = "multi_thread")]
async fn mapper_dropped_messages_still_count_towards_stats() {
    init_test_tracing();

    let users = StreamKey::unnamespaced("users");
    let source = MemorySource::with_messages(users_script(&users));
    let destination = MemoryDestination::new();

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source,
        destination.clone(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        DropRecordsMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Completed);
    // Stats are taken before the mapper runs.
    assert_eq!(output.summary.records_synced, 2);

    // Only the state and the terminal status make it to the destination.
    assert_eq!(
        destination.accepted().await,
        vec![
            Message::stream_state(&users, 1, json!({"cursor": 2})),
            Message::stream_status(&users, ConnectorStreamStatus::Complete),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn source_read_failure_fails_the_attempt() {
    init_test_tracing();

    let source = MemorySource::new();
    source.fail_on_read("connection reset").await;
    let destination = MemoryDestination::new();

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source,
        destination.clone(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Source);
    assert!(destination.end_of_input_received().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn nonzero_source_exit_fails_the_attempt() {
    init_test_tracing();

    let users = StreamKey::unnamespaced("users");
    let source = MemorySource::with_messages(vec![
        Message::stream_status(&users, ConnectorStreamStatus::Started),
        Message::record(&users, json!({"id": 1}), 0),
    ]);
    source.set_exit_value(2).await;
    let destination = MemoryDestination::new();

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source,
        destination.clone(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Source);
    assert!(output.failures[0].message.contains("non-zero"));

    // A failed source still owes the destination terminal INCOMPLETE statuses for
    // every stream it touched.
    assert!(destination.accepted().await.contains(&Message::stream_status(
        &users,
        ConnectorStreamStatus::Incomplete
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_accept_failure_fails_the_attempt() {
    init_test_tracing();

    let users = StreamKey::unnamespaced("users");
    let source = MemorySource::with_messages(vec![Message::record(&users, json!({"id": 1}), 0)]);
    let destination = MemoryDestination::new();
    destination.fail_on_accept("disk full").await;

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source,
        destination,
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Destination);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_cancels_both_connectors() {
    init_test_tracing();

    let source = MemorySource::new();
    source.set_infinite().await;
    let destination = MemoryDestination::new();

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source.clone(),
        destination.clone(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );
    let worker_state = pipeline.worker_state();

    let handle = tokio::spawn(pipeline.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    worker_state.mark_cancelled();

    let output = handle.await.unwrap().unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Cancelled);
    assert!(output.failures.is_empty());
    assert!(source.was_cancelled().await);
    assert!(destination.was_cancelled().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn gone_workload_cancels_the_attempt() {
    init_test_tracing();

    let source = MemorySource::new();
    source.set_infinite().await;

    let mut config = test_config();
    config.heartbeat.interval_ms = 20;

    let pipeline = ReplicationPipeline::new(
        config,
        test_input(),
        source.clone(),
        MemoryDestination::new(),
        MemorySyncPersistence::new(),
        GoneControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Cancelled);
    assert!(output.failures.is_empty());
    assert!(source.was_cancelled().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_source_trips_the_heartbeat_monitor() {
    init_test_tracing();

    let source = MemorySource::new();
    source.set_infinite().await;

    let mut config = test_config();
    config.heartbeat = HeartbeatConfig {
        interval_ms: 25,
        max_gap_secs: 1,
        source_idle_timeout_secs: 1,
        destination_idle_timeout_secs: 7_200,
    };

    let pipeline = ReplicationPipeline::new(
        config,
        test_input(),
        source,
        MemoryDestination::new(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Source);
    assert!(output.failures[0].message.contains("stopped emitting"));
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_destination_trips_the_heartbeat_monitor() {
    init_test_tracing();

    let source = MemorySource::new();
    source.set_infinite().await;

    let mut config = test_config();
    config.heartbeat = HeartbeatConfig {
        interval_ms: 25,
        max_gap_secs: 1,
        source_idle_timeout_secs: 7_200,
        destination_idle_timeout_secs: 1,
    };

    let pipeline = ReplicationPipeline::new(
        config,
        test_input(),
        source,
        MemoryDestination::new(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Destination);
    assert!(output.failures[0].message.contains("stopped accepting"));
}

#[tokio::test(flavor = "multi_thread")]
async fn start_failure_skips_the_running_phase() {
    init_test_tracing();

    let users = StreamKey::unnamespaced("users");
    let source = MemorySource::with_messages(vec![Message::record(&users, json!({"id": 1}), 0)]);
    let destination = MemoryDestination::new();
    // Starting the destination ahead of time makes the pipeline's own start fail.
    destination
        .start(&serde_json::Value::Null, std::path::Path::new("/tmp"))
        .await
        .unwrap();

    let pipeline = ReplicationPipeline::new(
        test_config(),
        test_input(),
        source,
        destination.clone(),
        MemorySyncPersistence::new(),
        OkControlPlane,
        IdentityMapper,
    );

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.summary.status, ReplicationStatus::Failed);
    assert_eq!(output.failures[0].origin, FailureOrigin::Destination);
    assert_eq!(output.summary.records_synced, 0);
    assert!(destination.accepted().await.is_empty());
    assert!(destination.was_closed().await);
}
