// Transactions bind together locking, logging, and the buffer pool behind
// the single entry point the rest of the engine talks to.

pub mod concurrency;
pub mod recovery;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use concurrency::{ConcurrencyMgr, LockTable};
use recovery::RecoveryMgr;

use crate::error::Result;
use crate::storage::{BlockId, BufferMgr, FileMgr, LogMgr};

pub use concurrency::LockTable as SharedLockTable;

/// Block number used for the end-of-file pseudo-lock taken by `size`/`append`.
pub const END_OF_FILE: i32 = -1;

static NEXT_TX_NUM: AtomicI64 = AtomicI64::new(0);

fn next_tx_number() -> i64 {
    NEXT_TX_NUM.fetch_add(1, Ordering::SeqCst) + 1
}

/// Tracks the buffers a single transaction currently has pinned. A block can
/// be pinned more than once; `unpin` only drops the underlying frame once the
/// last matching pin is gone.
struct BufferList {
    buffers: HashMap<BlockId, usize>,
    pins: Vec<BlockId>,
}

impl BufferList {
    fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            pins: Vec::new(),
        }
    }

    fn get_buffer(&self, blk: &BlockId) -> usize {
        *self
            .buffers
            .get(blk)
            .unwrap_or_else(|| panic!("block {blk} is not pinned by this transaction"))
    }

    fn pin(&mut self, bm: &BufferMgr, blk: &BlockId) -> Result<()> {
        let idx = bm.pin(blk)?;
        self.buffers.insert(blk.clone(), idx);
        self.pins.push(blk.clone());
        Ok(())
    }

    fn unpin(&mut self, bm: &BufferMgr, blk: &BlockId) {
        if let Some(&idx) = self.buffers.get(blk) {
            bm.unpin(idx);
            if let Some(pos) = self.pins.iter().position(|b| b == blk) {
                self.pins.remove(pos);
            }
            if !self.pins.contains(blk) {
                self.buffers.remove(blk);
            }
        }
    }

    fn unpin_all(&mut self, bm: &BufferMgr) {
        for blk in &self.pins {
            let idx = self.buffers[blk];
            bm.unpin(idx);
        }
        self.buffers.clear();
        self.pins.clear();
    }
}

/// One client transaction: owns its lock set, its recovery manager, and the
/// buffers it has pinned. Strict two-phase locking means every lock it
/// acquires is held until `commit`/`rollback`.
pub struct Transaction {
    fm: Arc<FileMgr>,
    bm: Arc<BufferMgr>,
    cm: ConcurrencyMgr,
    rm: RecoveryMgr,
    txnum: i64,
    mybuffers: std::sync::Mutex<BufferList>,
}

impl Transaction {
    pub fn new(fm: Arc<FileMgr>, lm: Arc<LogMgr>, bm: Arc<BufferMgr>, locktable: Arc<LockTable>) -> Result<Self> {
        let txnum = next_tx_number();
        tracing::info!(txnum, "new transaction");
        let rm = RecoveryMgr::new(txnum, lm, Arc::clone(&bm))?;
        Ok(Self {
            fm,
            bm,
            cm: ConcurrencyMgr::new(locktable),
            rm,
            txnum,
            mybuffers: std::sync::Mutex::new(BufferList::new()),
        })
    }

    pub fn tx_number(&self) -> i64 {
        self.txnum
    }

    pub fn commit(&self) -> Result<()> {
        self.rm.commit()?;
        self.cm.release();
        self.mybuffers.lock().unwrap().unpin_all(&self.bm);
        tracing::info!(txnum = self.txnum, "transaction committed");
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.rm.rollback(self)?;
        self.cm.release();
        self.mybuffers.lock().unwrap().unpin_all(&self.bm);
        tracing::info!(txnum = self.txnum, "transaction rolled back");
        Ok(())
    }

    /// Runs at startup, before any client transaction is allowed to proceed:
    /// flushes this (bootstrap) transaction's buffers, then undoes whatever
    /// was left unfinished by the previous run.
    pub fn recover(&self) -> Result<()> {
        self.bm.flush_all(self.txnum)?;
        self.rm.recover(self)
    }

    pub fn pin(&self, blk: &BlockId) -> Result<()> {
        self.mybuffers.lock().unwrap().pin(&self.bm, blk)
    }

    pub fn unpin(&self, blk: &BlockId) {
        self.mybuffers.lock().unwrap().unpin(&self.bm, blk);
    }

    pub fn get_int(&self, blk: &BlockId, offset: usize) -> Result<i32> {
        self.cm.slock(blk)?;
        let idx = self.mybuffers.lock().unwrap().get_buffer(blk);
        Ok(self.bm.with_buffer(idx, |b| b.contents().get_int(offset)))
    }

    pub fn get_string(&self, blk: &BlockId, offset: usize) -> Result<String> {
        self.cm.slock(blk)?;
        let idx = self.mybuffers.lock().unwrap().get_buffer(blk);
        Ok(self.bm.with_buffer(idx, |b| b.contents().get_string(offset)))
    }

    pub fn set_int(&self, blk: &BlockId, offset: usize, val: i32, ok_to_log: bool) -> Result<()> {
        self.cm.xlock(blk)?;
        let idx = self.mybuffers.lock().unwrap().get_buffer(blk);
        let lsn = if ok_to_log {
            self.rm.set_int(idx, offset, blk)? as i64
        } else {
            -1
        };
        self.bm.with_buffer_mut(idx, |b| {
            b.contents_mut().set_int(offset, val);
            b.set_modified(self.txnum, lsn);
        });
        Ok(())
    }

    pub fn set_string(&self, blk: &BlockId, offset: usize, val: &str, ok_to_log: bool) -> Result<()> {
        self.cm.xlock(blk)?;
        let idx = self.mybuffers.lock().unwrap().get_buffer(blk);
        let lsn = if ok_to_log {
            self.rm.set_string(idx, offset, blk)? as i64
        } else {
            -1
        };
        self.bm.with_buffer_mut(idx, |b| {
            b.contents_mut().set_string(offset, val);
            b.set_modified(self.txnum, lsn);
        });
        Ok(())
    }

    pub fn size(&self, filename: &str) -> Result<usize> {
        let dummyblk = BlockId::new(filename, END_OF_FILE);
        self.cm.slock(&dummyblk)?;
        self.fm.length(filename)
    }

    pub fn append(&self, filename: &str) -> Result<BlockId> {
        let dummyblk = BlockId::new(filename, END_OF_FILE);
        self.cm.xlock(&dummyblk)?;
        self.fm.append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.fm.block_size()
    }

    pub fn available_buffs(&self) -> usize {
        self.bm.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(poolsize: usize) -> (TempDir, Arc<FileMgr>, Arc<LogMgr>, Arc<BufferMgr>, Arc<LockTable>) {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "log").unwrap());
        let bm = Arc::new(BufferMgr::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            poolsize,
            Duration::from_millis(300),
        ));
        let lt = Arc::new(LockTable::new(Duration::from_millis(300)));
        (dir, fm, lm, bm, lt)
    }

    #[test]
    fn set_and_get_roundtrip_within_one_transaction() {
        let (_dir, fm, lm, bm, lt) = setup(8);
        let tx = Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt)).unwrap();
        let blk = BlockId::new("testfile", 1);
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 80, 1, false).unwrap();
        tx.set_string(&blk, 40, "one", false).unwrap();
        assert_eq!(tx.get_int(&blk, 80).unwrap(), 1);
        assert_eq!(tx.get_string(&blk, 40).unwrap(), "one");
        tx.commit().unwrap();
    }

    #[test]
    fn rollback_undoes_uncommitted_writes() {
        let (_dir, fm, lm, bm, lt) = setup(8);
        let blk = BlockId::new("testfile", 1);

        let tx1 = Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt)).unwrap();
        tx1.pin(&blk).unwrap();
        tx1.set_int(&blk, 80, 1, true).unwrap();
        tx1.set_string(&blk, 40, "one", true).unwrap();
        tx1.commit().unwrap();

        let tx2 = Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt)).unwrap();
        tx2.pin(&blk).unwrap();
        tx2.set_int(&blk, 80, 9999, true).unwrap();
        tx2.rollback().unwrap();

        let tx3 = Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt)).unwrap();
        tx3.pin(&blk).unwrap();
        assert_eq!(tx3.get_int(&blk, 80).unwrap(), 1);
        tx3.commit().unwrap();
    }

    #[test]
    fn size_and_append_grow_the_file() {
        let (_dir, fm, lm, bm, lt) = setup(8);
        let tx = Transaction::new(fm, lm, bm, lt).unwrap();
        assert_eq!(tx.size("newfile").unwrap(), 0);
        let blk = tx.append("newfile").unwrap();
        assert_eq!(blk.blknum, 0);
        assert_eq!(tx.size("newfile").unwrap(), 1);
        tx.commit().unwrap();
    }
}
