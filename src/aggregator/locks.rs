//! Per-climb mutual exclusion.
//!
//! Recomputing a climb is a read-then-write without a transaction, so two
//! overlapping passes can persist a stale snapshot last. Holding a lock keyed
//! by climb id around the pass removes that race within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock for one climb id and the number of holders plus waiters.
#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

/// Keyed async locks, one per climb id with holders or waiters.
#[derive(Debug, Default)]
pub struct ClimbLocks {
    inner: Mutex<HashMap<String, Slot>>,
}

/// A counted use of a slot, given back on drop whether or not the lock was
/// ever acquired.
#[derive(Debug)]
struct Claim<'a> {
    locks: &'a ClimbLocks,
    climb_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.climb_id);
    }
}

/// Exclusive access to one climb. Released on drop.
#[derive(Debug)]
pub struct ClimbGuard<'a> {
    // Field order: the mutex is unlocked before the claim is given back.
    _guard: OwnedMutexGuard<()>,
    claim: Claim<'a>,
}

impl ClimbLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, climb_id: &str) {
        let mut map = self.map();
        if let Some(slot) = map.get_mut(climb_id) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                map.remove(climb_id);
            }
        }
    }

    /// Wait for exclusive access to `climb_id`.
    ///
    /// Dropping the returned future before it completes leaves no entry
    /// behind.
    pub async fn lock(&self, climb_id: &str) -> ClimbGuard<'_> {
        let mutex = {
            let mut map = self.map();
            let slot = map.entry(climb_id.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        let claim = Claim {
            locks: self,
            climb_id: climb_id.to_string(),
        };

        ClimbGuard {
            _guard: mutex.lock_owned().await,
            claim,
        }
    }

    /// Number of climb ids currently locked or waited on.
    pub fn active(&self) -> usize {
        self.map().len()
    }
}

impl ClimbGuard<'_> {
    pub fn climb_id(&self) -> &str {
        &self.claim.climb_id
    }
}
