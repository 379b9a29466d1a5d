use std::future::Future;
use std::time::Duration;

use sync_config::shared::PipelineConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::concurrency::queue::ClosableQueue;
use crate::concurrency::shutdown::create_shutdown_channel;
use crate::connector::base::{DestinationConnector, SourceConnector};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::mapper::MessageMapper;
use crate::persistence::SyncPersistence;
use crate::state::stats::SyncStatsTracker;
use crate::state::store::StreamStatusStateStore;
use crate::state::tracker::{StreamStatusTracker, StreamStatusUpdateEvent};
use crate::sync_error;
use crate::types::{
    FailureReason, Message, ReplicationAttemptSummary, ReplicationInput, ReplicationOutput,
    ReplicationStatus,
};
use crate::workers::base::{ReplicationWorkerState, TimeTracker};
use crate::workers::destination_reader::DestinationReader;
use crate::workers::destination_writer::DestinationWriter;
use crate::workers::heartbeat::{ControlPlaneClient, WorkloadHeartbeatSender};
use crate::workers::monitor::ActivityMonitor;
use crate::workers::processor::MessageProcessor;
use crate::workers::source_reader::SourceReader;

/// Coordinator of a single replication attempt.
///
/// Runs the attempt through its phases: both connectors are started concurrently,
/// the four stages plus the heartbeat sender run until the stream of messages is
/// exhausted or aborted, then everything is wound down and a terminal summary is
/// produced. Handled replication failures end up in the output rather than in an
/// `Err`; the error path is reserved for faults of the coordinator itself.
pub struct ReplicationPipeline<S, D, P, C, M> {
    config: PipelineConfig,
    input: ReplicationInput,
    source: S,
    destination: D,
    persistence: P,
    heartbeat_client: C,
    mapper: M,
    worker_state: ReplicationWorkerState,
    events_tx: mpsc::UnboundedSender<StreamStatusUpdateEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamStatusUpdateEvent>>,
}

impl<S, D, P, C, M> ReplicationPipeline<S, D, P, C, M>
where
    S: SourceConnector + Clone + Send + Sync + 'static,
    D: DestinationConnector + Clone + Send + Sync + 'static,
    P: SyncPersistence + Clone + Send + Sync + 'static,
    C: ControlPlaneClient + Clone + Send + Sync + 'static,
    M: MessageMapper + Clone + Send + Sync + 'static,
{
    pub fn new(
        config: PipelineConfig,
        input: ReplicationInput,
        source: S,
        destination: D,
        persistence: P,
        heartbeat_client: C,
        mapper: M,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            input,
            source,
            destination,
            persistence,
            heartbeat_client,
            mapper,
            worker_state: ReplicationWorkerState::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Handle for observing and cancelling the attempt from outside.
    ///
    /// Calling [`ReplicationWorkerState::mark_cancelled`] on it makes every stage
    /// wind down at its next loop boundary and yields a CANCELLED summary.
    pub fn worker_state(&self) -> ReplicationWorkerState {
        self.worker_state.clone()
    }

    /// Takes the stream status event receiver.
    ///
    /// Returns [`None`] if already taken. If the receiver is never taken, events
    /// are silently discarded.
    pub fn status_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamStatusUpdateEvent>> {
        self.events_rx.take()
    }

    /// Runs the attempt to completion and builds its summary.
    pub async fn run(self) -> SyncResult<ReplicationOutput> {
        let span = info_span!(
            "replication",
            pipeline_id = self.config.id,
            connection_id = %self.input.context.connection_id,
            job_id = self.input.context.job_id,
            attempt = self.input.context.attempt_number,
        );

        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> SyncResult<ReplicationOutput> {
        // If nobody subscribed, drop the receiver so events are discarded eagerly.
        drop(self.events_rx.take());

        let worker_state = self.worker_state.clone();
        let time_tracker = TimeTracker::new();
        let stats = SyncStatsTracker::new();
        let tracker = StreamStatusTracker::new(
            StreamStatusStateStore::new(),
            self.input.context,
            self.events_tx.clone(),
        );

        time_tracker.track_replication_start();
        info!("starting replication pipeline");

        if self.start_connectors().await {
            self.run_stages(&worker_state, &time_tracker, &stats, &tracker)
                .await;
        }

        self.cleanup().await;
        time_tracker.track_replication_end();

        let status = if worker_state.cancelled() {
            ReplicationStatus::Cancelled
        } else if worker_state.failed() {
            ReplicationStatus::Failed
        } else {
            ReplicationStatus::Completed
        };

        let summary = ReplicationAttemptSummary {
            status,
            records_synced: stats.total_records(),
            bytes_synced: stats.total_bytes(),
            stream_stats: stats.per_stream(),
            source_state_messages_emitted: stats.source_state_count(),
            destination_state_messages_emitted: stats.destination_state_count(),
            times: time_tracker.snapshot(),
        };

        info!(
            ?status,
            records = summary.records_synced,
            bytes = summary.bytes_synced,
            "replication pipeline finished"
        );

        Ok(ReplicationOutput {
            summary,
            failures: worker_state.failures(),
        })
    }

    /// Starts both connectors concurrently.
    ///
    /// Returns whether the attempt may proceed to the running phase; start failures
    /// are recorded on the worker state.
    async fn start_connectors(&self) -> bool {
        let (source_started, destination_started) = tokio::join!(
            self.source
                .start(&self.input.source_config, &self.input.job_root),
            self.destination
                .start(&self.input.destination_config, &self.input.job_root),
        );

        let mut started = true;

        if let Err(err) = source_started {
            let err = sync_error!(
                ErrorKind::SourceError,
                "Failed to start source connector",
                err
            );
            error!("{err}");
            self.worker_state
                .track_failure(FailureReason::from_error(&err));
            self.worker_state.mark_failed();
            started = false;
        }

        if let Err(err) = destination_started {
            let err = sync_error!(
                ErrorKind::DestinationError,
                "Failed to start destination connector",
                err
            );
            error!("{err}");
            self.worker_state
                .track_failure(FailureReason::from_error(&err));
            self.worker_state.mark_failed();
            started = false;
        }

        started
    }

    async fn run_stages(
        &self,
        worker_state: &ReplicationWorkerState,
        time_tracker: &TimeTracker,
        stats: &SyncStatsTracker,
        tracker: &StreamStatusTracker,
    ) {
        let source_queue = ClosableQueue::new(self.config.source_queue_size);
        let destination_queue = ClosableQueue::new(self.config.destination_queue_size);
        let source_monitor = ActivityMonitor::new(self.config.heartbeat.source_idle_timeout());
        let destination_monitor =
            ActivityMonitor::new(self.config.heartbeat.destination_idle_timeout());
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let heartbeat = WorkloadHeartbeatSender::new(
            self.heartbeat_client.clone(),
            self.input.workload_id.clone(),
            worker_state.clone(),
            source_monitor.clone(),
            destination_monitor.clone(),
            self.config.heartbeat.interval(),
            self.config.heartbeat.max_gap(),
            shutdown_rx,
        );
        let heartbeat_handle =
            tokio::spawn(heartbeat.run().instrument(info_span!("heartbeat_sender")));

        let source_reader = SourceReader::new(
            self.source.clone(),
            source_queue.clone(),
            worker_state.clone(),
            tracker.clone(),
            source_monitor,
            time_tracker.clone(),
            poll_interval,
        );
        let processor = MessageProcessor::new(
            source_queue.clone(),
            destination_queue.clone(),
            worker_state.clone(),
            tracker.clone(),
            stats.clone(),
            self.mapper.clone(),
        );
        let writer = DestinationWriter::new(
            self.source.clone(),
            self.destination.clone(),
            destination_queue.clone(),
            worker_state.clone(),
            tracker.clone(),
            destination_monitor,
            time_tracker.clone(),
        );
        let reader = DestinationReader::new(
            self.destination.clone(),
            self.persistence.clone(),
            worker_state.clone(),
            tracker.clone(),
            stats.clone(),
            poll_interval,
        );

        let handles = vec![
            self.spawn_stage("source_reader", &source_queue, &destination_queue, async move {
                source_reader.run().await
            }),
            self.spawn_stage(
                "message_processor",
                &source_queue,
                &destination_queue,
                async move { processor.run().await },
            ),
            self.spawn_stage(
                "destination_writer",
                &source_queue,
                &destination_queue,
                async move { writer.run().await },
            ),
            self.spawn_stage(
                "destination_reader",
                &source_queue,
                &destination_queue,
                async move { reader.run().await },
            ),
        ];

        for handle in handles {
            if let Err(join_error) = handle.await {
                let err = sync_error!(
                    ErrorKind::StageWorkerPanic,
                    "A pipeline stage panicked",
                    join_error
                );
                error!("{err}");
                worker_state.track_failure(FailureReason::from_error(&err));
                worker_state.mark_failed();
                worker_state.request_abort();
                source_queue.close();
                destination_queue.close();
            }
        }

        // Heartbeats are only needed while stages run.
        let _ = shutdown_tx.shutdown();
        let _ = heartbeat_handle.await;

        if !worker_state.cancelled() {
            info!("all replication stages finished");
        }
    }

    /// Spawns a stage with failure handling attached.
    ///
    /// A failing stage flips the attempt to failed, requests an abort and closes
    /// both queues so the remaining stages unblock.
    fn spawn_stage<F>(
        &self,
        name: &'static str,
        source_queue: &ClosableQueue<Message>,
        destination_queue: &ClosableQueue<Message>,
        stage: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let worker_state = self.worker_state.clone();
        let source_queue = source_queue.clone();
        let destination_queue = destination_queue.clone();

        tokio::spawn(
            async move {
                if let Err(err) = stage.await {
                    error!("stage failed: {err}");
                    worker_state.track_failure(FailureReason::from_error(&err));
                    worker_state.mark_failed();
                    worker_state.request_abort();
                    source_queue.close();
                    destination_queue.close();
                }
            }
            .instrument(info_span!("stage", name)),
        )
    }

    /// Closes the external collaborators in a fixed order.
    ///
    /// Close failures are recorded as additional failures; they never mask an
    /// earlier one.
    async fn cleanup(&self) {
        if let Err(err) = self.source.close().await {
            let err = sync_error!(
                ErrorKind::SourceError,
                "Failed to close source connector",
                err
            );
            warn!("{err}");
            self.worker_state
                .track_failure(FailureReason::from_error(&err));
            self.worker_state.mark_failed();
        }

        if let Err(err) = self.destination.close().await {
            let err = sync_error!(
                ErrorKind::DestinationError,
                "Failed to close destination connector",
                err
            );
            warn!("{err}");
            self.worker_state
                .track_failure(FailureReason::from_error(&err));
            self.worker_state.mark_failed();
        }

        if let Err(err) = self.persistence.close().await {
            let err = sync_error!(
                ErrorKind::ReplicationError,
                "Failed to close persistence client",
                err
            );
            warn!("{err}");
            self.worker_state
                .track_failure(FailureReason::from_error(&err));
            self.worker_state.mark_failed();
        }
    }
}
