//! Verdict mailbox.

pub mod memory;

pub use memory::{VerdictMailbox, VerdictReceiver, VerdictSender};
