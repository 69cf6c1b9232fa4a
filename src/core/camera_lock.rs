//! Exclusive lock over the single physical PTZ camera.
//!
//! Waiters are served in FIFO order (backed by a tokio semaphore with one
//! permit), so a slot cannot be starved by later arrivals. Ownership is
//! tracked per lease: every successful acquisition records `(slot, lease id)`
//! and a lease can only clear the record it created.
//!
//! Release is scoped. [`CameraLease::release`] consumes the lease, and
//! dropping a lease releases it as well, which covers cancellation and
//! panics inside a worker. A second release of the same lease does not
//! type-check.
//!
//! ```rust,ignore
//! let lock = CameraLock::new();
//! let token = CancellationToken::new();
//! let lease = lock.acquire(0, &token).await?;
//! assert_eq!(lock.holder(), Some(0));
//! lease.release()?;
//! assert!(!lock.is_locked());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::LockError;
use crate::util::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Holder {
    slot: SlotId,
    lease_id: u64,
}

#[derive(Debug)]
struct LockState {
    permits: Arc<Semaphore>,
    holder: Mutex<Option<Holder>>,
    next_lease: AtomicU64,
    acquire_timeout: Option<Duration>,
}

/// Mutual exclusion over the shared camera. Cloning shares the same lock.
#[derive(Debug, Clone)]
pub struct CameraLock {
    inner: Arc<LockState>,
}

impl Default for CameraLock {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraLock {
    /// Create an unbounded-wait lock.
    pub fn new() -> Self {
        Self::with_acquire_timeout(None)
    }

    /// Create a lock whose acquisitions give up after `timeout`.
    pub fn with_acquire_timeout(timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(LockState {
                permits: Arc::new(Semaphore::new(1)),
                holder: Mutex::new(None),
                next_lease: AtomicU64::new(1),
                acquire_timeout: timeout,
            }),
        }
    }

    /// Wait for the camera on behalf of `slot`.
    ///
    /// # Errors
    ///
    /// - `LockError::Cancelled` if `token` fires while waiting
    /// - `LockError::Timeout` if the configured acquisition timeout elapses
    /// - `LockError::Closed` after [`CameraLock::close`]
    pub async fn acquire(
        &self,
        slot: SlotId,
        token: &CancellationToken,
    ) -> Result<CameraLease, LockError> {
        let wait = Arc::clone(&self.inner.permits).acquire_owned();

        let permit = match self.inner.acquire_timeout {
            Some(limit) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(LockError::Cancelled(slot)),
                res = tokio::time::timeout(limit, wait) => match res {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(LockError::Closed),
                    Err(_) => {
                        tracing::warn!(
                            slot_id = slot,
                            timeout_ms = limit.as_millis() as u64,
                            "camera lock acquisition timed out"
                        );
                        return Err(LockError::Timeout(slot));
                    }
                },
            },
            None => tokio::select! {
                biased;
                () = token.cancelled() => return Err(LockError::Cancelled(slot)),
                res = wait => res.map_err(|_| LockError::Closed)?,
            },
        };

        Ok(self.register(slot, permit))
    }

    /// Take the camera only if it is free right now.
    pub fn try_acquire(&self, slot: SlotId) -> Option<CameraLease> {
        let permit = Arc::clone(&self.inner.permits).try_acquire_owned().ok()?;
        Some(self.register(slot, permit))
    }

    fn register(&self, slot: SlotId, permit: OwnedSemaphorePermit) -> CameraLease {
        let lease_id = self.inner.next_lease.fetch_add(1, Ordering::Relaxed);
        let holder = Holder { slot, lease_id };
        {
            let mut current = self.inner.holder.lock();
            debug_assert!(current.is_none(), "camera lock permit granted while held");
            *current = Some(holder);
        }
        tracing::debug!(slot_id = slot, lease_id, "camera lock acquired");
        CameraLease {
            lock: Arc::clone(&self.inner),
            holder,
            permit: Some(permit),
        }
    }

    /// Slot currently holding the camera.
    pub fn holder(&self) -> Option<SlotId> {
        self.inner.holder.lock().map(|h| h.slot)
    }

    /// Whether any slot holds the camera.
    pub fn is_locked(&self) -> bool {
        self.inner.holder.lock().is_some()
    }

    /// Refuse all future acquisitions. Pending waiters fail with `Closed`.
    pub fn close(&self) {
        self.inner.permits.close();
    }
}

/// Proof of camera ownership for one slot. Releases on drop.
#[derive(Debug)]
pub struct CameraLease {
    lock: Arc<LockState>,
    holder: Holder,
    permit: Option<OwnedSemaphorePermit>,
}

impl CameraLease {
    /// Slot owning this lease.
    pub fn slot(&self) -> SlotId {
        self.holder.slot
    }

    /// Release the camera.
    ///
    /// # Errors
    ///
    /// Returns `LockError::NotHolder` if the lock no longer records this
    /// lease as the holder. The permit is returned either way.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        let Some(permit) = self.permit.take() else {
            return Ok(());
        };
        let result = {
            let mut current = self.lock.holder.lock();
            if *current == Some(self.holder) {
                *current = None;
                Ok(())
            } else {
                Err(LockError::NotHolder {
                    slot: self.holder.slot,
                    holder: current.map(|h| h.slot),
                })
            }
        };
        drop(permit);
        tracing::debug!(
            slot_id = self.holder.slot,
            lease_id = self.holder.lease_id,
            "camera lock released"
        );
        result
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if self.permit.is_some() {
            if let Err(e) = self.release_inner() {
                tracing::error!(error = %e, "camera lease dropped with inconsistent ownership");
            }
        }
    }
}
