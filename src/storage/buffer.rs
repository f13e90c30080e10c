// Buffer pool: a fixed-size cache of pinned, dirty-tracked pages sitting
// between the transaction layer and the file manager. The replacement
// policy is a deliberately naive "first unpinned frame" scan — a future
// implementer may swap in LRU as long as the pin/WAL contracts below still
// hold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::file::{BlockId, FileMgr, Page};
use super::log::LogMgr;
use crate::error::{DbError, Result};

/// Pairs one resident page with a `BlockId`, a pin count, and enough state
/// to know whether (and on whose behalf) it is dirty.
pub struct Buffer {
    fm: Arc<FileMgr>,
    lm: Arc<LogMgr>,
    contents: Page,
    blk: Option<BlockId>,
    pins: i32,
    modifying_tx: i64,
    lsn: i64,
}

impl Buffer {
    fn new(fm: Arc<FileMgr>, lm: Arc<LogMgr>) -> Self {
        let block_size = fm.block_size();
        Self {
            fm,
            lm,
            contents: Page::new(block_size),
            blk: None,
            pins: 0,
            modifying_tx: -1,
            lsn: -1,
        }
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.blk.as_ref()
    }

    pub fn modifying_tx(&self) -> i64 {
        self.modifying_tx
    }

    /// Records that `txnum` dirtied this page via the log record at `lsn`
    /// (or `lsn < 0` for a non-logged write, e.g. `RecordPage::format`).
    pub fn set_modified(&mut self, txnum: i64, lsn: i64) {
        self.modifying_tx = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    fn pin(&mut self) {
        self.pins += 1;
    }

    fn unpin(&mut self) {
        self.pins -= 1;
    }

    fn assign_to_block(&mut self, blk: BlockId) -> Result<()> {
        self.flush()?;
        self.fm.read(&blk, &mut self.contents)?;
        self.blk = Some(blk);
        self.pins = 0;
        Ok(())
    }

    /// Write-ahead: if dirty, force the log up to `self.lsn` before writing
    /// the data page, then mark the buffer clean via an explicit marker
    /// (never by decrementing the modifying transaction number).
    pub fn flush(&mut self) -> Result<()> {
        if self.modifying_tx >= 0 {
            if let Some(blk) = &self.blk {
                self.lm.flush(self.lsn as u64)?;
                self.fm.write(blk, &self.contents)?;
                self.mark_clean();
            }
        }
        Ok(())
    }

    fn mark_clean(&mut self) {
        self.modifying_tx = -1;
    }
}

struct Pool {
    buffers: Vec<Buffer>,
    num_available: usize,
}

/// A fixed-size pool of `Buffer` slots (default 8).
pub struct BufferMgr {
    pool: Mutex<Pool>,
    cv: Condvar,
    max_time: Duration,
}

impl BufferMgr {
    pub fn new(fm: Arc<FileMgr>, lm: Arc<LogMgr>, numbuffs: usize, max_time: Duration) -> Self {
        let buffers = (0..numbuffs)
            .map(|_| Buffer::new(Arc::clone(&fm), Arc::clone(&lm)))
            .collect();
        Self {
            pool: Mutex::new(Pool {
                buffers,
                num_available: numbuffs,
            }),
            cv: Condvar::new(),
            max_time,
        }
    }

    pub fn available(&self) -> usize {
        self.pool.lock().num_available
    }

    /// Flushes every buffer currently dirtied by `txnum` (called at commit
    /// and rollback).
    pub fn flush_all(&self, txnum: i64) -> Result<()> {
        let mut pool = self.pool.lock();
        for buff in pool.buffers.iter_mut() {
            if buff.modifying_tx() == txnum {
                buff.flush()?;
            }
        }
        Ok(())
    }

    /// Pins `blk`, waiting on the pool condvar (bounded by `max_time` total)
    /// if no frame is free. Returns an index into the pool rather than a
    /// borrow, since callers hold it across further locking operations.
    pub fn pin(&self, blk: &BlockId) -> Result<usize> {
        let start = Instant::now();
        let mut pool = self.pool.lock();
        let mut idx = self.try_to_pin(&mut pool, blk)?;
        while idx.is_none() {
            if start.elapsed() >= self.max_time {
                return Err(DbError::BufferAbort);
            }
            let remaining = self.max_time.saturating_sub(start.elapsed());
            self.cv.wait_for(&mut pool, remaining);
            idx = self.try_to_pin(&mut pool, blk)?;
        }
        Ok(idx.unwrap())
    }

    pub fn unpin(&self, idx: usize) {
        let mut pool = self.pool.lock();
        pool.buffers[idx].unpin();
        if !pool.buffers[idx].is_pinned() {
            pool.num_available += 1;
            self.cv.notify_all();
        }
    }

    pub fn with_buffer<R>(&self, idx: usize, f: impl FnOnce(&Buffer) -> R) -> R {
        let pool = self.pool.lock();
        f(&pool.buffers[idx])
    }

    pub fn with_buffer_mut<R>(&self, idx: usize, f: impl FnOnce(&mut Buffer) -> R) -> R {
        let mut pool = self.pool.lock();
        f(&mut pool.buffers[idx])
    }

    fn try_to_pin(&self, pool: &mut Pool, blk: &BlockId) -> Result<Option<usize>> {
        let existing = pool
            .buffers
            .iter()
            .position(|b| b.block().is_some_and(|b| b == blk));
        let idx = match existing {
            Some(idx) => idx,
            None => match self.choose_unpinned_buffer(pool) {
                Some(idx) => {
                    pool.buffers[idx].assign_to_block(blk.clone())?;
                    idx
                }
                None => return Ok(None),
            },
        };
        if !pool.buffers[idx].is_pinned() {
            pool.num_available -= 1;
        }
        pool.buffers[idx].pin();
        Ok(Some(idx))
    }

    fn choose_unpinned_buffer(&self, pool: &Pool) -> Option<usize> {
        pool.buffers.iter().position(|b| !b.is_pinned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn setup(poolsize: usize) -> (TempDir, Arc<FileMgr>, Arc<LogMgr>, Arc<BufferMgr>) {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "log").unwrap());
        let bm = Arc::new(BufferMgr::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            poolsize,
            Duration::from_millis(300),
        ));
        (dir, fm, lm, bm)
    }

    #[test]
    fn pin_reuses_resident_block() {
        let (_dir, _fm, _lm, bm) = setup(3);
        let blk = BlockId::new("f", 0);
        let i1 = bm.pin(&blk).unwrap();
        let i2 = bm.pin(&blk).unwrap();
        assert_eq!(i1, i2);
    }

    #[test]
    fn pin_aborts_after_timeout_when_pool_exhausted() {
        let (_dir, _fm, _lm, bm) = setup(1);
        let _held = bm.pin(&BlockId::new("f", 0)).unwrap();
        let err = bm.pin(&BlockId::new("f", 1));
        assert!(matches!(err, Err(DbError::BufferAbort)));
    }

    #[test]
    fn unpin_wakes_a_waiting_pinner() {
        let (_dir, _fm, _lm, bm) = setup(1);
        let held = bm.pin(&BlockId::new("f", 0)).unwrap();
        let bm2 = Arc::clone(&bm);
        let waiter = thread::spawn(move || bm2.pin(&BlockId::new("f", 1)));
        thread::sleep(Duration::from_millis(50));
        bm.unpin(held);
        let result = waiter.join().unwrap();
        assert!(result.is_ok());
    }
}
