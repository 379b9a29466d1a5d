use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::types::{FailureReason, ReplicationTimes};

/// Control flags and failure bookkeeping shared by every stage of a pipeline.
///
/// All operations are lock-free or take a short internal lock; none of them can
/// fail or block, so stages may call them from any point, including error paths.
#[derive(Debug, Clone, Default)]
pub struct ReplicationWorkerState {
    inner: Arc<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    cancelled: AtomicBool,
    failed: AtomicBool,
    abort_requested: AtomicBool,
    failures: Mutex<Vec<FailureReason>>,
}

impl ReplicationWorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the attempt as externally cancelled.
    ///
    /// Cancellation implies abortion: stages observing [`Self::should_abort`] wind
    /// down at their next loop boundary.
    pub fn mark_cancelled(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn mark_failed(&self) {
        self.inner.failed.store(true, Ordering::SeqCst);
    }

    /// Requests that all stages stop at their next loop boundary.
    pub fn request_abort(&self) {
        self.inner.abort_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub fn should_abort(&self) -> bool {
        self.inner.abort_requested.load(Ordering::SeqCst) || self.cancelled()
    }

    /// Appends a classified failure to the attempt's failure list.
    pub fn track_failure(&self, failure: FailureReason) {
        self.lock_failures().push(failure);
    }

    /// Returns the failures recorded so far, in arrival order.
    pub fn failures(&self) -> Vec<FailureReason> {
        self.lock_failures().clone()
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Vec<FailureReason>> {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock phase stamps for the attempt, shared across stages.
///
/// Stamps are epoch milliseconds; a stamp of zero means the phase never ran.
#[derive(Debug, Clone, Default)]
pub struct TimeTracker {
    inner: Arc<TimesInner>,
}

#[derive(Debug, Default)]
struct TimesInner {
    replication_start: AtomicI64,
    replication_end: AtomicI64,
    source_read_start: AtomicI64,
    source_read_end: AtomicI64,
    destination_write_start: AtomicI64,
    destination_write_end: AtomicI64,
}

impl TimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_replication_start(&self) {
        self.inner.replication_start.store(now_ms(), Ordering::SeqCst);
    }

    pub fn track_replication_end(&self) {
        self.inner.replication_end.store(now_ms(), Ordering::SeqCst);
    }

    pub fn track_source_read_start(&self) {
        self.inner.source_read_start.store(now_ms(), Ordering::SeqCst);
    }

    pub fn track_source_read_end(&self) {
        self.inner.source_read_end.store(now_ms(), Ordering::SeqCst);
    }

    pub fn track_destination_write_start(&self) {
        self.inner
            .destination_write_start
            .store(now_ms(), Ordering::SeqCst);
    }

    pub fn track_destination_write_end(&self) {
        self.inner
            .destination_write_end
            .store(now_ms(), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ReplicationTimes {
        ReplicationTimes {
            replication_start: self.inner.replication_start.load(Ordering::SeqCst),
            replication_end: self.inner.replication_end.load(Ordering::SeqCst),
            source_read_start: self.inner.source_read_start.load(Ordering::SeqCst),
            source_read_end: self.inner.source_read_end.load(Ordering::SeqCst),
            destination_write_start: self.inner.destination_write_start.load(Ordering::SeqCst),
            destination_write_end: self.inner.destination_write_end.load(Ordering::SeqCst),
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
