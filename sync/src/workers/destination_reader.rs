use std::time::Duration;

use tracing::info;

use crate::bail;
use crate::connector::base::DestinationConnector;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::persistence::SyncPersistence;
use crate::state::stats::SyncStatsTracker;
use crate::state::tracker::StreamStatusTracker;
use crate::types::Message;
use crate::workers::base::ReplicationWorkerState;

/// Last stage of the pipeline: drains acknowledgements out of the destination.
///
/// State messages coming back from the destination are handed to the persistence
/// client and to the status tracker, which is where stream completion is actually
/// decided. On abort the destination connector is cancelled before the final exit
/// code check.
pub struct DestinationReader<D, P> {
    destination: D,
    persistence: P,
    worker_state: ReplicationWorkerState,
    status_tracker: StreamStatusTracker,
    stats: SyncStatsTracker,
    poll_interval: Duration,
}

impl<D, P> DestinationReader<D, P>
where
    D: DestinationConnector + Send + Sync,
    P: SyncPersistence + Send + Sync,
{
    pub fn new(
        destination: D,
        persistence: P,
        worker_state: ReplicationWorkerState,
        status_tracker: StreamStatusTracker,
        stats: SyncStatsTracker,
        poll_interval: Duration,
    ) -> Self {
        Self {
            destination,
            persistence,
            worker_state,
            status_tracker,
            stats,
            poll_interval,
        }
    }

    pub async fn run(self) -> SyncResult<()> {
        loop {
            if self.worker_state.should_abort() {
                info!("destination reader aborting, cancelling destination connector");
                self.destination.cancel().await?;
                break;
            }

            if self.destination.is_finished().await {
                break;
            }

            match self.destination.attempt_read().await? {
                Some(message) => {
                    self.stats.accept_from_destination(&message);

                    if let Message::State(state) = &message {
                        self.persistence.persist(state).await?;
                    }

                    self.status_tracker.track(&message).await;
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }

        if self.destination.is_finished().await {
            let exit_value = self.destination.exit_value().await?;
            if exit_value != 0 {
                bail!(
                    ErrorKind::DestinationError,
                    "Destination process exited with non-zero code",
                    format!("exit code: {exit_value}")
                );
            }
        }

        Ok(())
    }
}
