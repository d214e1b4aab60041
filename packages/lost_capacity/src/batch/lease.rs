//! Recomputing every network takes a while, and two runs at the same time
//! would only get in each other's way. A run therefore needs to hold a
//! lease, which expires by itself in case the holder never releases it.

use crate::common::error::{LostCapacityError, Result};
use rustc_hash::FxHashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Somewhere leases can be kept, shared between everything which might want
/// to start a run
pub trait LeaseStore: Send + Sync {
    /// Take the lease for key on behalf of holder. Fails if anybody (holder
    /// included) currently holds a lease which hasn't expired yet.
    fn acquire(
        &self,
        key: &str,
        holder: &str,
        timeout: Duration,
    ) -> Result<()>;

    /// Give up the lease for key, if it is still held by holder
    fn release(&self, key: &str, holder: &str);
}

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires: Instant,
}

/// Lease store for a single process
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<FxHashMap<String, Lease>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> InMemoryLeaseStore {
        InMemoryLeaseStore::default()
    }

    /// A panic while holding the lock can't leave the map in a broken state,
    /// so carry on with whatever is in it
    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, Lease>> {
        self.leases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current holder of a lease which hasn't expired yet
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|lease| lease.expires > now)
            .map(|lease| lease.holder.clone())
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn acquire(
        &self,
        key: &str,
        holder: &str,
        timeout: Duration,
    ) -> Result<()> {
        let now = Instant::now();
        let mut leases = self.lock();

        if let Some(lease) = leases.get(key) {
            if lease.expires > now {
                return Err(LostCapacityError::LeaseHeld {
                    key: key.to_string(),
                    holder: lease.holder.clone(),
                });
            }
            warn!(
                "Lease {} held by {} has expired, taking it over",
                key, lease.holder
            );
        }

        leases.insert(
            key.to_string(),
            Lease {
                holder: holder.to_string(),
                expires: now + timeout,
            },
        );
        debug!("Lease {} acquired by {}", key, holder);

        Ok(())
    }

    fn release(&self, key: &str, holder: &str) {
        let mut leases = self.lock();
        if leases.get(key).is_some_and(|lease| lease.holder == holder) {
            leases.remove(key);
            debug!("Lease {} released by {}", key, holder);
        }
    }
}

/// Holds a lease for as long as it is in scope, releasing it when dropped.
/// This makes sure the lease is given up even when a run fails part way.
pub struct LeaseGuard<'a> {
    store: &'a dyn LeaseStore,
    key: String,
    holder: String,
}

impl<'a> LeaseGuard<'a> {
    pub fn acquire(
        store: &'a dyn LeaseStore,
        key: &str,
        holder: &str,
        timeout: Duration,
    ) -> Result<LeaseGuard<'a>> {
        store.acquire(key, holder, timeout)?;
        Ok(LeaseGuard {
            store,
            key: key.to_string(),
            holder: holder.to_string(),
        })
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.store.release(&self.key, &self.holder);
    }
}
