use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::connector::base::{DestinationConnector, SourceConnector};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::Message;
use crate::{bail, sync_error};

/// In-memory [`SourceConnector`] fed from a scripted list of messages.
///
/// Once the script is exhausted the source terminates with its configured exit
/// value, unless it is marked infinite, in which case it idles until cancelled.
/// Failure injection hooks cover the error paths the pipeline has to handle.
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<SourceInner>>,
}

#[derive(Debug, Default)]
struct SourceInner {
    script: VecDeque<Message>,
    started: bool,
    finished: bool,
    cancelled: bool,
    closed: bool,
    infinite: bool,
    exit_value: i32,
    fail_on_read: Option<&'static str>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceInner::default())),
        }
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceInner {
                script: messages.into(),
                ..Default::default()
            })),
        }
    }

    /// Keeps the source running after the script drains instead of terminating.
    pub async fn set_infinite(&self) {
        self.inner.lock().await.infinite = true;
    }

    /// Exit value reported once the source terminates.
    pub async fn set_exit_value(&self, exit_value: i32) {
        self.inner.lock().await.exit_value = exit_value;
    }

    /// Makes every subsequent read fail with the given description.
    pub async fn fail_on_read(&self, description: &'static str) {
        self.inner.lock().await.fail_on_read = Some(description);
    }

    pub async fn was_cancelled(&self) -> bool {
        self.inner.lock().await.cancelled
    }

    pub async fn was_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceConnector for MemorySource {
    async fn start(&self, _config: &serde_json::Value, _job_root: &Path) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.started {
            bail!(
                ErrorKind::InvalidState,
                "Source connector was already started"
            );
        }
        inner.started = true;
        Ok(())
    }

    async fn attempt_read(&self) -> SyncResult<Option<Message>> {
        let mut inner = self.inner.lock().await;

        if let Some(description) = inner.fail_on_read {
            return Err(sync_error!(
                ErrorKind::SourceError,
                "Source read failed",
                description
            ));
        }

        if let Some(message) = inner.script.pop_front() {
            return Ok(Some(message));
        }

        if !inner.infinite {
            inner.finished = true;
        }
        Ok(None)
    }

    async fn is_finished(&self) -> bool {
        self.inner.lock().await.finished
    }

    async fn exit_value(&self) -> SyncResult<i32> {
        let inner = self.inner.lock().await;
        if !inner.finished {
            bail!(ErrorKind::InvalidState, "Source connector is still running");
        }
        Ok(inner.exit_value)
    }

    async fn cancel(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.cancelled = true;
        inner.finished = true;
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.finished = true;
        inner.closed = true;
        Ok(())
    }
}

/// In-memory [`DestinationConnector`] that records what it accepts.
///
/// Every accepted state message is echoed back as an acknowledgement, readable
/// through [`DestinationConnector::attempt_read`], mimicking how a real destination
/// checkpoints. The destination terminates once the end of input was signalled and
/// all acknowledgements were drained.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<DestinationInner>>,
}

#[derive(Debug, Default)]
struct DestinationInner {
    accepted: Vec<Message>,
    acknowledgements: VecDeque<Message>,
    started: bool,
    end_of_input: bool,
    finished: bool,
    cancelled: bool,
    closed: bool,
    exit_value: i32,
    accept_delay: Option<Duration>,
    fail_on_accept: Option<&'static str>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DestinationInner::default())),
        }
    }

    pub async fn set_exit_value(&self, exit_value: i32) {
        self.inner.lock().await.exit_value = exit_value;
    }

    /// Stalls every accept call, for exercising the destination timeout path.
    pub async fn set_accept_delay(&self, delay: Duration) {
        self.inner.lock().await.accept_delay = Some(delay);
    }

    pub async fn fail_on_accept(&self, description: &'static str) {
        self.inner.lock().await.fail_on_accept = Some(description);
    }

    /// Messages accepted so far, in arrival order.
    pub async fn accepted(&self) -> Vec<Message> {
        self.inner.lock().await.accepted.clone()
    }

    pub async fn was_cancelled(&self) -> bool {
        self.inner.lock().await.cancelled
    }

    pub async fn was_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn end_of_input_received(&self) -> bool {
        self.inner.lock().await.end_of_input
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationConnector for MemoryDestination {
    async fn start(&self, _config: &serde_json::Value, _job_root: &Path) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.started {
            bail!(
                ErrorKind::InvalidState,
                "Destination connector was already started"
            );
        }
        inner.started = true;
        Ok(())
    }

    async fn accept(&self, message: Message) -> SyncResult<()> {
        let delay = self.inner.lock().await.accept_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().await;

        if let Some(description) = inner.fail_on_accept {
            return Err(sync_error!(
                ErrorKind::DestinationError,
                "Destination rejected a message",
                description
            ));
        }

        if let Message::State(_) = &message {
            inner.acknowledgements.push_back(message.clone());
        }
        inner.accepted.push(message);
        Ok(())
    }

    async fn notify_end_of_input(&self) -> SyncResult<()> {
        self.inner.lock().await.end_of_input = true;
        Ok(())
    }

    async fn attempt_read(&self) -> SyncResult<Option<Message>> {
        let mut inner = self.inner.lock().await;

        if let Some(message) = inner.acknowledgements.pop_front() {
            return Ok(Some(message));
        }

        if inner.end_of_input {
            inner.finished = true;
        }
        Ok(None)
    }

    async fn is_finished(&self) -> bool {
        self.inner.lock().await.finished
    }

    async fn exit_value(&self) -> SyncResult<i32> {
        let inner = self.inner.lock().await;
        if !inner.finished {
            bail!(
                ErrorKind::InvalidState,
                "Destination connector is still running"
            );
        }
        Ok(inner.exit_value)
    }

    async fn cancel(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.cancelled = true;
        inner.finished = true;
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.finished = true;
        inner.closed = true;
        Ok(())
    }
}
