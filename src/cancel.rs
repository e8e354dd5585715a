// src/cancel.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Per-upload cancellation: a shared flag plus a registry of in-flight network
//! transfers that are force-closed when the flag is raised.
//!
//! A flag alone is not enough: a worker stuck in a stalled write never returns
//! to a loop boundary to look at it. Every transfer therefore registers an
//! abort handle for as long as it runs, and `cancel()` aborts them all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{AbortHandle, Abortable, Aborted};
use tracing::debug;

use crate::error::PartError;

#[derive(Default)]
struct Registry {
    cancelled: bool,
    handles: HashMap<u64, AbortHandle>,
}

struct Inner {
    flag: tokio_util::sync::CancellationToken,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

/// Cloneable handle shared by the coordinator, every worker and every network call.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: tokio_util::sync::CancellationToken::new(),
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Raise the flag and force-close every registered transfer. Idempotent.
    pub fn cancel(&self) {
        let handles: Vec<AbortHandle> = {
            let mut reg = self.registry();
            if reg.cancelled {
                return;
            }
            reg.cancelled = true;
            reg.handles.drain().map(|(_, h)| h).collect()
        };
        debug!("Cancelling upload, closing {} in-flight transfers", handles.len());
        self.inner.flag.cancel();
        for h in handles {
            h.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.is_cancelled()
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        self.inner.flag.cancelled().await
    }

    /// Number of transfers currently registered.
    pub fn in_flight(&self) -> usize {
        self.registry().handles.len()
    }

    /// Register an abort handle until the returned guard is dropped.
    ///
    /// Registration and `cancel()` serialize on the same lock, so a handle is
    /// either seen by `cancel()` or refused here; none slips through.
    pub fn register(&self, handle: AbortHandle) -> Result<Registration, PartError> {
        let mut reg = self.registry();
        if reg.cancelled {
            handle.abort();
            return Err(PartError::Cancelled);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        reg.handles.insert(id, handle);
        Ok(Registration {
            token: self.clone(),
            id,
        })
    }

    /// Run `fut` as a registered transfer: it is registered before its first
    /// poll and aborted by `cancel()` at any await point.
    pub async fn run_abortable<F, T>(&self, fut: F) -> Result<T, PartError>
    where
        F: std::future::Future<Output = T>,
    {
        let (handle, reg) = AbortHandle::new_pair();
        let _guard = self.register(handle)?;
        match Abortable::new(fut, reg).await {
            Ok(v) => Ok(v),
            Err(Aborted) => Err(PartError::Cancelled),
        }
    }
}

/// Scoped registration; deregisters on drop.
pub struct Registration {
    token: CancellationToken,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.token.registry().handles.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_interrupts_a_stalled_transfer() {
        let token = CancellationToken::new();
        let t2 = token.clone();
        let task = tokio::spawn(async move {
            t2.run_abortable(futures::future::pending::<()>()).await
        });

        while token.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();

        let res = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("transfer did not observe cancel")
            .unwrap();
        assert_eq!(res, Err(PartError::Cancelled));
        assert_eq!(token.in_flight(), 0);
    }

    #[tokio::test]
    async fn registration_after_cancel_is_refused() {
        let token = CancellationToken::new();
        token.cancel();
        let res = token.run_abortable(async { 7 }).await;
        assert_eq!(res, Err(PartError::Cancelled));
    }

    #[tokio::test]
    async fn completed_transfer_deregisters() {
        let token = CancellationToken::new();
        let v = token.run_abortable(async { 42 }).await.unwrap();
        assert_eq!(v, 42);
        assert_eq!(token.in_flight(), 0);
        assert!(!token.is_cancelled());
    }
}
