use tracing::info;

use crate::concurrency::queue::ClosableQueue;
use crate::error::SyncResult;
use crate::mapper::MessageMapper;
use crate::state::stats::SyncStatsTracker;
use crate::state::tracker::StreamStatusTracker;
use crate::types::Message;
use crate::workers::base::ReplicationWorkerState;

/// Emit a progress log line every this many records.
const RECORDS_PER_PROGRESS_LOG: u64 = 5000;

/// Middle stage of the pipeline: tracks, maps and filters source messages.
///
/// Records and state messages are tracked and counted, run through the mapper, and
/// forwarded to the destination queue; every other message kind stops here. Both
/// queues are closed when the stage exits, so its neighbours unblock no matter why
/// it stopped.
pub struct MessageProcessor<M> {
    input: ClosableQueue<Message>,
    output: ClosableQueue<Message>,
    worker_state: ReplicationWorkerState,
    status_tracker: StreamStatusTracker,
    stats: SyncStatsTracker,
    mapper: M,
}

impl<M> MessageProcessor<M>
where
    M: MessageMapper + Send + Sync,
{
    pub fn new(
        input: ClosableQueue<Message>,
        output: ClosableQueue<Message>,
        worker_state: ReplicationWorkerState,
        status_tracker: StreamStatusTracker,
        stats: SyncStatsTracker,
        mapper: M,
    ) -> Self {
        Self {
            input,
            output,
            worker_state,
            status_tracker,
            stats,
            mapper,
        }
    }

    pub async fn run(self) -> SyncResult<()> {
        let result = self.process().await;

        self.input.close();
        self.output.close();

        result
    }

    async fn process(&self) -> SyncResult<()> {
        while !self.worker_state.should_abort() {
            let Some(message) = self.input.receive().await else {
                break;
            };

            if matches!(message, Message::Record(_) | Message::State(_)) {
                self.status_tracker.track(&message).await;
            }

            let records = self.stats.accept_from_source(&message);
            if matches!(message, Message::Record(_)) && records % RECORDS_PER_PROGRESS_LOG == 0 {
                info!(records, "records read from source");
            }

            let Some(message) = self.mapper.map(message)? else {
                continue;
            };

            if matches!(message, Message::Record(_) | Message::State(_))
                && !self.output.send(message).await
            {
                break;
            }
        }

        Ok(())
    }
}
