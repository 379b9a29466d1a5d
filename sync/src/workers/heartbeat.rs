use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncError};
use crate::sync_error;
use crate::types::FailureReason;
use crate::workers::base::ReplicationWorkerState;
use crate::workers::monitor::ActivityMonitor;

/// Client for the control plane endpoint that tracks workload liveness.
pub trait ControlPlaneClient {
    fn send_heartbeat(
        &self,
        workload_id: &str,
    ) -> impl Future<Output = Result<(), HeartbeatApiError>> + Send;
}

/// Failure modes of a heartbeat call.
#[derive(Debug, Clone, Error)]
pub enum HeartbeatApiError {
    /// The control plane no longer recognizes the workload; the attempt must stop.
    #[error("workload is gone: {0}")]
    Gone(String),
    /// Anything retryable: network errors, 5xx responses, timeouts.
    #[error("heartbeat request failed: {0}")]
    Transient(String),
}

/// Periodic liveness loop for a replication attempt.
///
/// Each tick first consults the connector idle monitors, then sends a heartbeat to
/// the control plane. A workload the control plane declared gone cancels the
/// attempt. Any other failure is tolerated until the time since the last successful
/// heartbeat exceeds the configured maximum gap, at which point the attempt is
/// failed, aborted, and the classified failure recorded.
pub struct WorkloadHeartbeatSender<C> {
    client: C,
    workload_id: String,
    worker_state: ReplicationWorkerState,
    source_monitor: ActivityMonitor,
    destination_monitor: ActivityMonitor,
    interval: Duration,
    max_gap: Duration,
    shutdown_rx: ShutdownRx,
}

impl<C> WorkloadHeartbeatSender<C>
where
    C: ControlPlaneClient + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: C,
        workload_id: String,
        worker_state: ReplicationWorkerState,
        source_monitor: ActivityMonitor,
        destination_monitor: ActivityMonitor,
        interval: Duration,
        max_gap: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            client,
            workload_id,
            worker_state,
            source_monitor,
            destination_monitor,
            interval,
            max_gap,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        let mut last_successful = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown_rx.changed() => {
                    debug!("heartbeat sender received shutdown signal");
                    return;
                }
            }

            let failure = if self.destination_monitor.timed_out() {
                sync_error!(
                    ErrorKind::DestinationTimeout,
                    "Destination has stopped accepting messages",
                    format!(
                        "threshold: {:?}, idle for: {:?}",
                        self.destination_monitor.timeout(),
                        self.destination_monitor.idle_for()
                    )
                )
            } else if self.source_monitor.timed_out() {
                sync_error!(
                    ErrorKind::SourceHeartbeatTimeout,
                    "Source has stopped emitting messages",
                    format!(
                        "threshold: {:?}, idle for: {:?}",
                        self.source_monitor.timeout(),
                        self.source_monitor.idle_for()
                    )
                )
            } else {
                match self.client.send_heartbeat(&self.workload_id).await {
                    Ok(()) => {
                        last_successful = Instant::now();
                        continue;
                    }
                    Err(HeartbeatApiError::Gone(detail)) => {
                        info!(
                            workload_id = %self.workload_id,
                            %detail,
                            "workload no longer recognized by the control plane, cancelling attempt"
                        );
                        self.worker_state.mark_cancelled();
                        return;
                    }
                    Err(HeartbeatApiError::Transient(detail)) => sync_error!(
                        ErrorKind::ControlPlaneHeartbeatFailed,
                        "Workload heartbeat failed",
                        detail
                    ),
                }
            };

            if last_successful.elapsed() > self.max_gap {
                error!(
                    %failure,
                    max_gap = ?self.max_gap,
                    "heartbeat gap exceeded the configured maximum, aborting replication"
                );
                self.worker_state.mark_failed();
                self.worker_state.request_abort();
                self.worker_state
                    .track_failure(FailureReason::from_error(&failure));
                return;
            }

            warn!(%failure, "heartbeat check failed, retrying");
        }
    }
}
