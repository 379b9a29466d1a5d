use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SyncResult;
use crate::types::StateMessage;

/// Sink for state messages acknowledged by the destination.
///
/// Where checkpoints actually go (API, database, file) is outside this crate; the
/// pipeline hands over every destination state message and closes the sink during
/// wind-down.
pub trait SyncPersistence {
    fn persist(&self, state: &StateMessage) -> impl Future<Output = SyncResult<()>> + Send;

    fn close(&self) -> impl Future<Output = SyncResult<()>> + Send;
}

/// In-memory [`SyncPersistence`] retaining every persisted state message.
#[derive(Debug, Clone, Default)]
pub struct MemorySyncPersistence {
    inner: Arc<Mutex<PersistenceInner>>,
}

#[derive(Debug, Default)]
struct PersistenceInner {
    states: Vec<StateMessage>,
    closed: bool,
}

impl MemorySyncPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn states(&self) -> Vec<StateMessage> {
        self.inner.lock().await.states.clone()
    }

    pub async fn was_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

impl SyncPersistence for MemorySyncPersistence {
    async fn persist(&self, state: &StateMessage) -> SyncResult<()> {
        self.inner.lock().await.states.push(state.clone());
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        self.inner.lock().await.closed = true;
        Ok(())
    }
}
