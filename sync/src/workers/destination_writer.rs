use tracing::{debug, warn};

use crate::concurrency::queue::ClosableQueue;
use crate::connector::base::{DestinationConnector, SourceConnector};
use crate::error::SyncResult;
use crate::state::tracker::StreamStatusTracker;
use crate::types::{FailureReason, Message};
use crate::workers::base::{ReplicationWorkerState, TimeTracker};
use crate::workers::monitor::ActivityMonitor;

/// Third stage of the pipeline: drains the destination queue into the destination.
///
/// After the queue is exhausted the writer forwards the terminal stream status
/// messages still owed to the destination, keyed by whether the source exited
/// cleanly; only a cancelled attempt skips them. The destination is told the input
/// ended no matter how the stage exits.
pub struct DestinationWriter<S, D> {
    source: S,
    destination: D,
    input: ClosableQueue<Message>,
    worker_state: ReplicationWorkerState,
    status_tracker: StreamStatusTracker,
    destination_monitor: ActivityMonitor,
    time_tracker: TimeTracker,
}

impl<S, D> DestinationWriter<S, D>
where
    S: SourceConnector + Send + Sync,
    D: DestinationConnector + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        destination: D,
        input: ClosableQueue<Message>,
        worker_state: ReplicationWorkerState,
        status_tracker: StreamStatusTracker,
        destination_monitor: ActivityMonitor,
        time_tracker: TimeTracker,
    ) -> Self {
        Self {
            source,
            destination,
            input,
            worker_state,
            status_tracker,
            destination_monitor,
            time_tracker,
        }
    }

    pub async fn run(self) -> SyncResult<()> {
        self.time_tracker.track_destination_write_start();
        let result = self.write().await;
        self.time_tracker.track_destination_write_end();

        if let Err(err) = self.destination.notify_end_of_input().await {
            match &result {
                // A notification failure never masks the primary failure.
                Err(_) => {
                    warn!("failed to notify destination of end of input: {err}");
                    self.worker_state
                        .track_failure(FailureReason::from_error(&err));
                }
                Ok(()) => return Err(err),
            }
        }

        result
    }

    async fn write(&self) -> SyncResult<()> {
        while !self.worker_state.should_abort() {
            let Some(message) = self.input.receive().await else {
                break;
            };

            self.destination_monitor.record();
            self.destination.accept(message).await?;
            self.destination_monitor.record();
        }

        // Nobody is waiting for terminal statuses once the attempt is cancelled. A
        // failure abort still owes the destination its INCOMPLETE statuses.
        if self.worker_state.cancelled() {
            return Ok(());
        }

        let source_exited_cleanly = !self.worker_state.should_abort()
            && self.source.is_finished().await
            && self.source.exit_value().await? == 0;

        let terminal_statuses = self.status_tracker.finalize(source_exited_cleanly).await;
        debug!(
            count = terminal_statuses.len(),
            source_exited_cleanly, "forwarding terminal stream statuses to destination"
        );
        for message in terminal_statuses {
            self.destination.accept(message).await?;
        }

        Ok(())
    }
}
