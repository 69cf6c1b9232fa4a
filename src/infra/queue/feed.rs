//! Detection feed between the streaming inference worker and polling slot workers.
//!
//! The producer never blocks: every buffer is a [`BoundedRing`] that drops
//! its oldest event when full. When the backend stream ends the feed is
//! marked terminated, which every reader observes on its next read until
//! the feed is reopened by a restarted backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::DetectionEvent;
use crate::infra::queue::BoundedRing;

/// Distribution of events among concurrent readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPolicy {
    /// Every reader gets its own copy of each event published after it subscribed.
    #[default]
    FanOut,
    /// Readers compete for one shared buffer; an event satisfies one reader.
    Shared,
}

/// Events drained by one read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedBatch {
    /// Events buffered for this reader since its previous read, oldest first.
    pub events: Vec<DetectionEvent>,
    /// Whether the backend stream has ended.
    pub terminated: bool,
}

struct FeedShared {
    policy: FeedPolicy,
    capacity: usize,
    shared: Arc<BoundedRing<DetectionEvent>>,
    subscribers: Mutex<Vec<Arc<BoundedRing<DetectionEvent>>>>,
    terminated: AtomicBool,
}

/// Publishing side of the detection feed. Cloning shares the feed.
#[derive(Clone)]
pub struct DetectionFeed {
    inner: Arc<FeedShared>,
}

impl std::fmt::Debug for DetectionFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionFeed")
            .field("policy", &self.inner.policy)
            .field("capacity", &self.inner.capacity)
            .field("readers", &self.reader_count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl DetectionFeed {
    /// Create a feed whose buffers hold `capacity` events each.
    pub fn new(policy: FeedPolicy, capacity: usize) -> Self {
        Self {
            inner: Arc::new(FeedShared {
                policy,
                capacity,
                shared: Arc::new(BoundedRing::new(capacity)),
                subscribers: Mutex::new(Vec::new()),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Configured distribution policy.
    pub fn policy(&self) -> FeedPolicy {
        self.inner.policy
    }

    /// Register a reader.
    pub fn subscribe(&self) -> FeedReader {
        let ring = match self.inner.policy {
            FeedPolicy::Shared => Arc::clone(&self.inner.shared),
            FeedPolicy::FanOut => {
                let ring = Arc::new(BoundedRing::new(self.inner.capacity));
                self.inner.subscribers.lock().push(Arc::clone(&ring));
                ring
            }
        };
        FeedReader {
            ring,
            feed: Arc::clone(&self.inner),
        }
    }

    /// Publish one event. Returns how many buffers dropped an old event to fit it.
    pub fn publish(&self, event: DetectionEvent) -> usize {
        match self.inner.policy {
            FeedPolicy::Shared => usize::from(matches!(self.inner.shared.push(event), Ok(Some(_)))),
            FeedPolicy::FanOut => {
                let mut subscribers = self.inner.subscribers.lock();
                // Readers that were dropped hold no other reference to their ring.
                subscribers.retain(|ring| Arc::strong_count(ring) > 1);
                subscribers
                    .iter()
                    .filter(|ring| matches!(ring.push(event.clone()), Ok(Some(_))))
                    .count()
            }
        }
    }

    /// Mark the backend stream as ended.
    pub fn terminate(&self) {
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            tracing::info!("detection feed terminated");
        }
    }

    /// Clear the terminated mark after the backend restarted.
    pub fn reopen(&self) {
        self.inner.terminated.store(false, Ordering::SeqCst);
    }

    /// Whether the backend stream has ended.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Number of live fan-out readers. Always 0 for the shared policy.
    pub fn reader_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|ring| Arc::strong_count(ring) > 1)
            .count()
    }
}

/// Reading side of the detection feed, owned by one polling slot worker.
pub struct FeedReader {
    ring: Arc<BoundedRing<DetectionEvent>>,
    feed: Arc<FeedShared>,
}

impl std::fmt::Debug for FeedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedReader")
            .field("buffered", &self.ring.len())
            .finish()
    }
}

impl FeedReader {
    /// Take every event buffered for this reader.
    pub fn read(&self) -> FeedBatch {
        FeedBatch {
            events: self.ring.drain(),
            terminated: self.feed.terminated.load(Ordering::SeqCst),
        }
    }

    /// Take the oldest buffered event, if any.
    pub fn try_next(&self) -> Option<DetectionEvent> {
        self.ring.try_pop()
    }
}
