//! Admission control for TCP sessions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Every slot is taken; the connection has to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session pool exhausted ({capacity} sessions)")]
pub struct PoolExhausted {
    pub capacity: usize,
}

/// A fixed number of session slots.
///
/// A slot is held by the [`SessionPermit`] for as long as the session task
/// owns it and returns to the pool when the permit drops.
#[derive(Debug, Clone)]
pub struct SessionPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission, moved into the session task.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a slot if one is free.
    pub fn try_admit(&self) -> Result<SessionPermit, PoolExhausted> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .map(|permit| SessionPermit { _permit: permit })
            .map_err(|_| PoolExhausted {
                capacity: self.capacity,
            })
    }

    /// Wait until a slot frees up. `None` once the pool is closed.
    pub async fn admit(&self) -> Option<SessionPermit> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| SessionPermit { _permit: permit })
    }

    /// Refuse all further admissions and wake every waiter.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}
