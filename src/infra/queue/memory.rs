//! In-memory bounded ring with drop-oldest overflow.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::VerifierError;

struct RingState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO that evicts the oldest item when full.
///
/// Producers never block. Consumers either poll (`try_pop`, `drain`) or await
/// the next item with [`BoundedRing::pop`].
pub struct BoundedRing<T> {
    max_depth: usize,
    state: Mutex<RingState<T>>,
    notify: Notify,
}

impl<T> BoundedRing<T> {
    /// Create a ring holding at most `max_depth` items (minimum 1).
    pub fn new(max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        Self {
            max_depth,
            state: Mutex::new(RingState {
                items: VecDeque::with_capacity(max_depth.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append `item`, returning the evicted oldest item if the ring was full.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::QueueClosed` after [`BoundedRing::close`]; the
    /// item is dropped.
    pub fn push(&self, item: T) -> Result<Option<T>, VerifierError> {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(VerifierError::QueueClosed("ring closed".into()));
            }
            let evicted = if state.items.len() >= self.max_depth {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        Ok(evicted)
    }

    /// Remove the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Remove every buffered item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Wait for the next item. Returns `None` once closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Reject further pushes and wake every waiter. Buffered items stay poppable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Buffered item count.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl<T> std::fmt::Debug for BoundedRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedRing")
            .field("max_depth", &self.max_depth)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
