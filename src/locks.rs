use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Namespace for a lock key, so product 7 and work order 7 do not contend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDomain {
    Product,
    WorkOrder,
}

/// In-process pessimistic row locking.
///
/// Two operations that touch the same product's lots, or the same work
/// order, must not interleave between their stock check and their write.
/// Each key maps to one `tokio::sync::Mutex`; holders keep the guard for
/// the duration of their database transaction. Entries are never removed;
/// the registry grows with the number of distinct products and orders
/// touched by this process.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<(LockDomain, i64), Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, domain: LockDomain, id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry((domain, id))
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Acquires several product locks in ascending-id order. Callers that
    /// need more than one product must come through here so that two
    /// overlapping lock sets cannot deadlock.
    pub async fn acquire_products(&self, ids: &[i64]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<i64> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(LockDomain::Product, id).await);
        }
        guards
    }
}
