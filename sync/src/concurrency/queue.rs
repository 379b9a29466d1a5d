use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

/// A bounded FIFO queue that can be closed exactly once.
///
/// Producers block (asynchronously) while the queue is full and open. Once the queue
/// is closed, sends become no-ops and receivers drain the remaining items before
/// observing the end of the queue. Closing is idempotent and one-way.
///
/// Cloning the queue produces another handle to the same underlying channel.
#[derive(Debug)]
pub struct ClosableQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ClosableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug)]
struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    /// Wakes receivers when an item arrives or the queue closes.
    readable: Notify,
    /// Wakes senders when space frees up or the queue closes.
    writable: Notify,
}

impl<T> ClosableQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                closed: AtomicBool::new(false),
                readable: Notify::new(),
                writable: Notify::new(),
            }),
        }
    }

    /// Enqueues an item, waiting while the queue is full.
    ///
    /// Returns `true` if the item was enqueued and `false` if the queue was closed,
    /// in which case the item is dropped.
    pub async fn send(&self, item: T) -> bool {
        let mut item = Some(item);
        loop {
            let notified = self.inner.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                if self.inner.closed.load(Ordering::SeqCst) {
                    return false;
                }

                let mut items = lock(&self.inner.items);
                if items.len() < self.inner.capacity {
                    // The loop owns `item` until it is actually enqueued.
                    if let Some(item) = item.take() {
                        items.push_back(item);
                    }
                    drop(items);

                    self.inner.readable.notify_one();

                    return true;
                }
            }

            notified.await;
        }
    }

    /// Dequeues the next item, waiting while the queue is empty and open.
    ///
    /// Returns [`None`] once the queue is closed and fully drained.
    pub async fn receive(&self) -> Option<T> {
        loop {
            let notified = self.inner.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut items = lock(&self.inner.items);
                if let Some(item) = items.pop_front() {
                    drop(items);

                    self.inner.writable.notify_one();

                    return Some(item);
                }

                if self.inner.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Closes the queue for new items.
    ///
    /// Items already enqueued remain receivable. Calling this more than once has no
    /// additional effect, and a closed queue can never be reopened.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.readable.notify_waiters();
            self.inner.writable.notify_waiters();
        }
    }

    /// Returns whether new items are rejected.
    pub fn is_closed_for_sending(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns whether the queue is closed and fully drained.
    pub fn is_closed_for_receiving(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) && lock(&self.inner.items).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.items).is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

fn lock<T>(mutex: &Mutex<VecDeque<T>>) -> std::sync::MutexGuard<'_, VecDeque<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
