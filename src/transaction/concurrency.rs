// Block-level shared/exclusive locking with timeout-based deadlock
// avoidance. `LockTable` is shared by every transaction in the process (held
// behind an `Arc`, never a true global); `ConcurrencyMgr` is one per
// transaction and tracks which locks that transaction currently holds so it
// can release them all together at commit/rollback (strict 2PL).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::super::storage::BlockId;
use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    Shared,
    Exclusive,
}

/// Process-wide map from block to lock state: positive N means N shared
/// holders, -1 means one exclusive holder, absent means unlocked.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, i32>>,
    cv: Condvar,
    max_time: Duration,
}

impl LockTable {
    pub fn new(max_time: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
            max_time,
        }
    }

    pub fn slock(&self, blk: &BlockId) -> Result<()> {
        let start = Instant::now();
        let mut locks = self.locks.lock();
        while Self::has_xlock(&locks, blk) {
            let remaining = self.max_time.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            self.cv.wait_for(&mut locks, remaining);
        }
        if Self::has_xlock(&locks, blk) {
            return Err(DbError::LockAbort);
        }
        let val = *locks.get(blk).unwrap_or(&0);
        locks.insert(blk.clone(), val + 1);
        Ok(())
    }

    /// Precondition: caller already holds an S-lock on `blk` (so any value
    /// beyond 1 in the table means another transaction is also present).
    pub fn xlock(&self, blk: &BlockId) -> Result<()> {
        let start = Instant::now();
        let mut locks = self.locks.lock();
        while Self::has_other_slocks(&locks, blk) {
            let remaining = self.max_time.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            self.cv.wait_for(&mut locks, remaining);
        }
        if Self::has_other_slocks(&locks, blk) {
            return Err(DbError::LockAbort);
        }
        locks.insert(blk.clone(), -1);
        Ok(())
    }

    pub fn unlock(&self, blk: &BlockId) {
        let mut locks = self.locks.lock();
        let val = *locks.get(blk).unwrap_or(&0);
        if val > 1 {
            locks.insert(blk.clone(), val - 1);
        } else {
            locks.remove(blk);
            self.cv.notify_all();
        }
    }

    fn has_xlock(locks: &HashMap<BlockId, i32>, blk: &BlockId) -> bool {
        *locks.get(blk).unwrap_or(&0) < 0
    }

    fn has_other_slocks(locks: &HashMap<BlockId, i32>, blk: &BlockId) -> bool {
        *locks.get(blk).unwrap_or(&0) > 1
    }
}

/// Per-transaction view onto the shared `LockTable`: acquires a lock from
/// the table only the first time this transaction needs it, and releases
/// everything it holds at once (strict 2PL).
pub struct ConcurrencyMgr {
    table: std::sync::Arc<LockTable>,
    locks: Mutex<HashMap<BlockId, Held>>,
}

impl ConcurrencyMgr {
    pub fn new(table: std::sync::Arc<LockTable>) -> Self {
        Self {
            table,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn slock(&self, blk: &BlockId) -> Result<()> {
        let already_held = self.locks.lock().contains_key(blk);
        if !already_held {
            self.table.slock(blk)?;
            self.locks.lock().insert(blk.clone(), Held::Shared);
        }
        Ok(())
    }

    pub fn xlock(&self, blk: &BlockId) -> Result<()> {
        if !self.has_xlock(blk) {
            self.slock(blk)?;
            self.table.xlock(blk)?;
            self.locks.lock().insert(blk.clone(), Held::Exclusive);
        }
        Ok(())
    }

    /// Unlocks every block this transaction holds. Mutation of the per-tx
    /// map happens under its own mutex, and each `unlock` call goes through
    /// `LockTable`'s own mutex/condvar — never a manager-local lock standing
    /// in for the table's.
    pub fn release(&self) {
        let mut locks = self.locks.lock();
        for blk in locks.keys() {
            self.table.unlock(blk);
        }
        locks.clear();
    }

    fn has_xlock(&self, blk: &BlockId) -> bool {
        matches!(self.locks.lock().get(blk), Some(Held::Exclusive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn shared_locks_from_different_managers_do_not_conflict() {
        let table = Arc::new(LockTable::new(Duration::from_millis(200)));
        let a = ConcurrencyMgr::new(Arc::clone(&table));
        let b = ConcurrencyMgr::new(Arc::clone(&table));
        let blk = BlockId::new("f", 0);
        assert!(a.slock(&blk).is_ok());
        assert!(b.slock(&blk).is_ok());
    }

    #[test]
    fn xlock_waits_for_other_shared_holder_then_aborts() {
        let table = Arc::new(LockTable::new(Duration::from_millis(100)));
        let a = ConcurrencyMgr::new(Arc::clone(&table));
        let b = ConcurrencyMgr::new(Arc::clone(&table));
        let blk = BlockId::new("f", 0);
        a.slock(&blk).unwrap();
        b.slock(&blk).unwrap();
        let err = b.xlock(&blk);
        assert!(matches!(err, Err(DbError::LockAbort)));
    }

    #[test]
    fn xlock_upgrade_succeeds_when_sole_holder() {
        let table = Arc::new(LockTable::new(Duration::from_millis(200)));
        let a = ConcurrencyMgr::new(Arc::clone(&table));
        let blk = BlockId::new("f", 0);
        a.slock(&blk).unwrap();
        assert!(a.xlock(&blk).is_ok());
    }

    #[test]
    fn release_lets_a_waiting_xlock_proceed() {
        let table = Arc::new(LockTable::new(Duration::from_millis(500)));
        let a = Arc::new(ConcurrencyMgr::new(Arc::clone(&table)));
        let b = Arc::new(ConcurrencyMgr::new(Arc::clone(&table)));
        let blk = BlockId::new("f", 0);
        a.slock(&blk).unwrap();

        let b2 = Arc::clone(&b);
        let blk2 = blk.clone();
        let waiter = thread::spawn(move || b2.xlock(&blk2));
        thread::sleep(Duration::from_millis(50));
        a.release();
        assert!(waiter.join().unwrap().is_ok());
    }
}
