use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// In-process mutual exclusion per account id. Writers lock every account an
/// operation touches, always in ascending id order, so two operations on
/// overlapping account sets cannot deadlock.
#[derive(Debug, Default)]
pub struct AccountLocks {
    slots: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

/// Held account locks; released on drop.
pub struct HeldAccounts {
    guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl HeldAccounts {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, account: i64) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(account).or_default())
    }

    /// Locks all `accounts`, giving up once `timeout` has elapsed in total.
    pub fn acquire(&self, accounts: &BTreeSet<i64>, timeout: Duration) -> Option<HeldAccounts> {
        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(accounts.len());
        for &account in accounts {
            let slot = self.slot(account);
            // already-held guards are released when `guards` drops
            let guard = slot.try_lock_arc_until(deadline)?;
            guards.push(guard);
        }
        Some(HeldAccounts { guards })
    }
}
