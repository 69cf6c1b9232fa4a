//! In-memory verdict mailbox (the result queue drained by the orchestrator).

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::Verdict;

/// Factory for the verdict channel.
///
/// Many producers (slot workers, the single-shot inference worker) and one
/// consumer (the orchestrator).
#[derive(Debug)]
pub struct VerdictMailbox;

impl VerdictMailbox {
    /// Create a mailbox holding up to `capacity` undelivered verdicts (minimum 1).
    pub fn channel(capacity: usize) -> (VerdictSender, VerdictReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (VerdictSender { tx }, VerdictReceiver { rx })
    }
}

/// Producer handle. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct VerdictSender {
    tx: mpsc::Sender<Verdict>,
}

impl VerdictSender {
    /// Deliver a verdict, waiting for room if the mailbox is full.
    ///
    /// Returns false if `token` fired first or the receiver is gone; the
    /// verdict is discarded in both cases.
    pub async fn post(&self, verdict: Verdict, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(slot_id = verdict.slot_id, "verdict dropped, worker cancelled");
                false
            }
            res = self.tx.send(verdict) => match res {
                Ok(()) => true,
                Err(_) => {
                    tracing::warn!(slot_id = verdict.slot_id, "verdict dropped, mailbox closed");
                    false
                }
            },
        }
    }

    /// Deliver without waiting. Returns false if the mailbox is full or closed.
    pub fn try_post(&self, verdict: Verdict) -> bool {
        self.tx.try_send(verdict).is_ok()
    }
}

/// Consumer handle, owned by the orchestrator.
#[derive(Debug)]
pub struct VerdictReceiver {
    rx: mpsc::Receiver<Verdict>,
}

impl VerdictReceiver {
    /// Take every verdict currently delivered, without blocking.
    pub fn drain(&mut self) -> Vec<Verdict> {
        let mut out = Vec::new();
        while let Ok(verdict) = self.rx.try_recv() {
            out.push(verdict);
        }
        out
    }

    /// Wait for the next verdict. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Verdict> {
        self.rx.recv().await
    }
}
