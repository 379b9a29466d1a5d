use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks the last time a connector showed signs of life.
///
/// A stage records activity whenever its connector produces or consumes something;
/// the heartbeat sender asks whether the configured idle window has elapsed since.
/// The monitor starts armed at construction time, so a connector that never does
/// anything still times out.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    inner: Arc<MonitorInner>,
}

#[derive(Debug)]
struct MonitorInner {
    started: Instant,
    last_activity_ms: AtomicU64,
    timeout: Duration,
}

impl ActivityMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                started: Instant::now(),
                last_activity_ms: AtomicU64::new(0),
                timeout,
            }),
        }
    }

    /// Records that activity happened now.
    pub fn record(&self) {
        let elapsed = self.inner.started.elapsed().as_millis() as u64;
        self.inner.last_activity_ms.store(elapsed, Ordering::SeqCst);
    }

    /// Time elapsed since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let now = self.inner.started.elapsed().as_millis() as u64;
        let last = self.inner.last_activity_ms.load(Ordering::SeqCst);
        Duration::from_millis(now.saturating_sub(last))
    }

    pub fn timed_out(&self) -> bool {
        self.idle_for() > self.inner.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_times_out_without_activity() {
        let monitor = ActivityMonitor::new(Duration::from_millis(20));
        assert!(!monitor.timed_out());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(monitor.timed_out());
    }

    #[tokio::test]
    async fn test_recording_activity_resets_the_window() {
        let monitor = ActivityMonitor::new(Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(30)).await;
        monitor.record();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Only 30ms since the recorded activity.
        assert!(!monitor.timed_out());
    }
}
