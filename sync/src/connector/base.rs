use std::future::Future;
use std::path::Path;

use crate::error::SyncResult;
use crate::types::Message;

/// A running source connector, seen purely through its protocol boundary.
///
/// How the underlying connector is launched (process, container, in-memory fake) is
/// outside this crate; the pipeline only drives the handle. Implementations are
/// expected to be cheap to clone, with all clones sharing the underlying connector.
pub trait SourceConnector {
    /// Starts the connector with its configuration, rooted at `job_root`.
    fn start(
        &self,
        config: &serde_json::Value,
        job_root: &Path,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Polls for the next message without blocking.
    ///
    /// Returns [`None`] when no message is currently available, which is not the same
    /// as the connector being finished.
    fn attempt_read(&self) -> impl Future<Output = SyncResult<Option<Message>>> + Send;

    /// Whether the connector has terminated.
    fn is_finished(&self) -> impl Future<Output = bool> + Send;

    /// Exit code of the terminated connector.
    ///
    /// Fails while the connector is still running.
    fn exit_value(&self) -> impl Future<Output = SyncResult<i32>> + Send;

    /// Requests the connector stop without waiting for a natural end of input.
    fn cancel(&self) -> impl Future<Output = SyncResult<()>> + Send;

    /// Releases the connector's resources.
    fn close(&self) -> impl Future<Output = SyncResult<()>> + Send;
}

/// A running destination connector, seen purely through its protocol boundary.
///
/// Destinations consume records and checkpoints and emit acknowledgement state
/// messages of their own, read back through [`DestinationConnector::attempt_read`].
pub trait DestinationConnector {
    fn start(
        &self,
        config: &serde_json::Value,
        job_root: &Path,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Hands a message to the destination, waiting until it is taken.
    fn accept(&self, message: Message) -> impl Future<Output = SyncResult<()>> + Send;

    /// Tells the destination no further messages will arrive.
    fn notify_end_of_input(&self) -> impl Future<Output = SyncResult<()>> + Send;

    /// Polls for the next message emitted by the destination without blocking.
    fn attempt_read(&self) -> impl Future<Output = SyncResult<Option<Message>>> + Send;

    fn is_finished(&self) -> impl Future<Output = bool> + Send;

    fn exit_value(&self) -> impl Future<Output = SyncResult<i32>> + Send;

    fn cancel(&self) -> impl Future<Output = SyncResult<()>> + Send;

    fn close(&self) -> impl Future<Output = SyncResult<()>> + Send;
}
