//! One-shot exit notification and per-identifier exclusion

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chaos_core::{Context, Result};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

/// Upper bound of a single condvar sleep, so cancellation is noticed
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Fires once when a supervised process has exited
#[derive(Debug, Default)]
pub struct ExitSignal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as exited and wake every waiter. Repeated calls are no-ops.
    pub fn fire(&self) {
        let mut fired = self.fired.lock();
        if !*fired {
            *fired = true;
            self.cond.notify_all();
        }
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.lock()
    }

    /// Block until fired, or until `ctx` is cancelled or past its deadline
    pub fn wait(&self, ctx: &Context) -> Result<()> {
        let mut fired = self.fired.lock();
        loop {
            if *fired {
                return Ok(());
            }
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            let slice = ctx
                .remaining()
                .map_or(CANCEL_POLL, |left| left.min(CANCEL_POLL));
            self.cond.wait_for(&mut fired, slice);
        }
    }
}

#[derive(Debug, Default)]
struct ExclusionLock {
    held: Mutex<bool>,
    cond: Condvar,
    /// Holder plus waiters; the table entry goes away when this drops to zero
    users: AtomicUsize,
}

impl ExclusionLock {
    fn lock(&self) {
        let mut held = self.held.lock();
        while *held {
            self.cond.wait(&mut held);
        }
        *held = true;
    }

    fn unlock(&self) {
        *self.held.lock() = false;
        self.cond.notify_one();
    }
}

/// Per-identifier locks that may be released from another thread
#[derive(Debug, Clone, Default)]
pub struct ExclusionTable {
    locks: Arc<DashMap<String, Arc<ExclusionLock>>>,
}

impl ExclusionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other guard for `identifier` is alive
    pub fn acquire(&self, identifier: &str) -> ExclusionGuard {
        let lock = {
            let entry = self
                .locks
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(ExclusionLock::default()));
            entry.users.fetch_add(1, Ordering::SeqCst);
            Arc::clone(entry.value())
        };

        lock.lock();

        ExclusionGuard {
            locks: Arc::clone(&self.locks),
            identifier: identifier.to_string(),
            lock,
        }
    }

    /// Identifiers currently held or waited for
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.locks.contains_key(identifier)
    }
}

/// Held exclusion for one identifier; dropping it releases the identifier
#[derive(Debug)]
pub struct ExclusionGuard {
    locks: Arc<DashMap<String, Arc<ExclusionLock>>>,
    identifier: String,
    lock: Arc<ExclusionLock>,
}

impl ExclusionGuard {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for ExclusionGuard {
    fn drop(&mut self) {
        self.lock.unlock();
        self.locks.remove_if(&self.identifier, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && lock.users.fetch_sub(1, Ordering::SeqCst) == 1
        });
    }
}
