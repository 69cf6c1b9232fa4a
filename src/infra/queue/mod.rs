//! In-process queues between slot workers and the inference worker.

pub mod feed;
pub mod job;
pub mod memory;

pub use feed::{DetectionFeed, FeedBatch, FeedPolicy, FeedReader};
pub use job::JobQueue;
pub use memory::BoundedRing;
