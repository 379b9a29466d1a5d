use std::time::Duration;

use tracing::{debug, info};

use crate::bail;
use crate::concurrency::queue::ClosableQueue;
use crate::connector::base::SourceConnector;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::state::tracker::StreamStatusTracker;
use crate::types::{Message, TraceMessage};
use crate::workers::base::{ReplicationWorkerState, TimeTracker};
use crate::workers::monitor::ActivityMonitor;

/// First stage of the pipeline: drains the source connector into the source queue.
///
/// Stream status traces are routed to the status tracker before being enqueued, so
/// source-side lifecycle information is recorded even if downstream stages lag.
/// The output queue is always closed on exit, which is how downstream stages learn
/// the source is done.
pub struct SourceReader<S> {
    source: S,
    output: ClosableQueue<Message>,
    worker_state: ReplicationWorkerState,
    status_tracker: StreamStatusTracker,
    source_monitor: ActivityMonitor,
    time_tracker: TimeTracker,
    poll_interval: Duration,
}

impl<S> SourceReader<S>
where
    S: SourceConnector + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        output: ClosableQueue<Message>,
        worker_state: ReplicationWorkerState,
        status_tracker: StreamStatusTracker,
        source_monitor: ActivityMonitor,
        time_tracker: TimeTracker,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            output,
            worker_state,
            status_tracker,
            source_monitor,
            time_tracker,
            poll_interval,
        }
    }

    pub async fn run(self) -> SyncResult<()> {
        self.time_tracker.track_source_read_start();
        let result = self.read().await;
        self.time_tracker.track_source_read_end();

        self.output.close();

        result
    }

    async fn read(&self) -> SyncResult<()> {
        loop {
            if self.worker_state.should_abort() {
                info!("source reader aborting, cancelling source connector");
                self.source.cancel().await?;
                return Ok(());
            }

            if self.source.is_finished().await {
                let exit_value = self.source.exit_value().await?;
                if exit_value != 0 {
                    bail!(
                        ErrorKind::SourceError,
                        "Source process exited with non-zero code",
                        format!("exit code: {exit_value}")
                    );
                }

                debug!("source connector exited cleanly");
                return Ok(());
            }

            match self.source.attempt_read().await? {
                Some(message) => {
                    self.source_monitor.record();

                    if matches!(&message, Message::Trace(TraceMessage::StreamStatus(_))) {
                        self.status_tracker.track(&message).await;
                    }

                    if !self.output.send(message).await {
                        debug!("source queue closed, stopping source reader");
                        return Ok(());
                    }
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}
