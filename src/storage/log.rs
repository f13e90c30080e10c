// Append-only write-ahead log. Records are packed right-to-left inside each
// block: the first 4 bytes of a log page hold the `boundary` — the offset of
// the most recently written record — and each new record is placed just
// before it, prefixed by its own length. Iteration walks backwards: newest
// record first within a block, then block by block down to block 0.

use std::sync::Arc;

use parking_lot::Mutex;

use super::file::{BlockId, FileMgr, Page};
use crate::error::Result;

struct LogMgrState {
    logpage: Page,
    currentblk: BlockId,
    latest_lsn: u64,
    last_saved_lsn: u64,
}

/// Serializes all appends and flushes behind one mutex.
pub struct LogMgr {
    fm: Arc<FileMgr>,
    logfile: String,
    state: Mutex<LogMgrState>,
}

impl LogMgr {
    pub fn new(fm: Arc<FileMgr>, logfile: impl Into<String>) -> Result<Self> {
        let logfile = logfile.into();
        let mut logpage = Page::new(fm.block_size());
        let logsize = fm.length(&logfile)?;
        let currentblk = if logsize == 0 {
            Self::append_new_block(&fm, &logfile, &mut logpage)?
        } else {
            let blk = BlockId::new(&logfile, logsize as i32 - 1);
            fm.read(&blk, &mut logpage)?;
            blk
        };

        Ok(Self {
            fm,
            logfile,
            state: Mutex::new(LogMgrState {
                logpage,
                currentblk,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Appends `logrec`, returning its LSN. LSNs are 1-based and strictly
    /// increase across successful appends.
    pub fn append(&self, logrec: &[u8]) -> Result<u64> {
        let mut state = self.state.lock();
        let bytesneeded = logrec.len() + 4;
        let mut boundary = state.logpage.get_int(0) as usize;
        if (boundary as i64) - (bytesneeded as i64) < 4 {
            Self::flush_locked(&self.fm, &mut state);
            state.currentblk = Self::append_new_block(&self.fm, &self.logfile, &mut state.logpage)?;
            boundary = state.logpage.get_int(0) as usize;
        }
        let recpos = boundary - bytesneeded;
        state.logpage.set_bytes(recpos, logrec);
        state.logpage.set_int(0, recpos as i32);
        state.latest_lsn += 1;
        Ok(state.latest_lsn)
    }

    /// No-op if `lsn` is already durable; otherwise forces the current log
    /// page to disk. `Buffer::flush` calls this before writing a dirty data
    /// page, which is the write-ahead invariant.
    pub fn flush(&self, lsn: u64) -> Result<()> {
        let mut state = self.state.lock();
        if lsn >= state.last_saved_lsn {
            Self::flush_locked(&self.fm, &mut state);
        }
        Ok(())
    }

    /// Flushes, then returns a single-pass backward iterator starting at the
    /// most recently appended record.
    pub fn iter(&self) -> Result<LogIterator> {
        let mut state = self.state.lock();
        Self::flush_locked(&self.fm, &mut state);
        LogIterator::new(Arc::clone(&self.fm), state.currentblk.clone())
    }

    fn flush_locked(fm: &FileMgr, state: &mut LogMgrState) {
        fm.write(&state.currentblk, &state.logpage)
            .expect("cannot write log block");
        state.last_saved_lsn = state.latest_lsn;
    }

    fn append_new_block(fm: &FileMgr, logfile: &str, logpage: &mut Page) -> Result<BlockId> {
        let blk = fm.append(logfile)?;
        logpage.set_int(0, fm.block_size() as i32);
        fm.write(&blk, logpage)?;
        Ok(blk)
    }
}

/// Single-pass backward iterator over the log: most recent record first
/// within a block, then the previous block, down to block 0.
pub struct LogIterator {
    fm: Arc<FileMgr>,
    blk: BlockId,
    page: Page,
    currentpos: usize,
    boundary: usize,
}

impl LogIterator {
    fn new(fm: Arc<FileMgr>, blk: BlockId) -> Result<Self> {
        let block_size = fm.block_size();
        let mut it = Self {
            fm,
            blk,
            page: Page::new(block_size),
            currentpos: 0,
            boundary: 0,
        };
        it.move_to_block(it.blk.clone())?;
        Ok(it)
    }

    fn move_to_block(&mut self, blk: BlockId) -> Result<()> {
        self.fm.read(&blk, &mut self.page)?;
        self.boundary = self.page.get_int(0) as usize;
        self.currentpos = self.boundary;
        self.blk = blk;
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        self.currentpos < self.fm.block_size() || self.blk.blknum > 0
    }
}

impl Iterator for LogIterator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if !self.has_next() {
            return None;
        }
        if self.currentpos == self.fm.block_size() {
            let blk = BlockId::new(self.blk.filename.clone(), self.blk.blknum - 1);
            self.move_to_block(blk).expect("cannot read log block");
        }
        let rec = self.page.get_bytes(self.currentpos);
        self.currentpos += rec.len() + 4;
        Some(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_record(s: &str, n: i32) -> Vec<u8> {
        let npos = Page::max_length(s.chars().count());
        let mut p = Page::new(npos + 4);
        p.set_string(0, s);
        p.set_int(npos, n);
        p.contents().to_vec()
    }

    #[test]
    fn lsns_are_strictly_monotonic() {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = LogMgr::new(fm, "log").unwrap();
        let mut last = 0u64;
        for i in 1..=10 {
            let lsn = lm.append(&make_record("x", i)).unwrap();
            assert!(lsn > last);
            last = lsn;
        }
    }

    #[test]
    fn log_wraps_and_iterates_backwards() {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = LogMgr::new(fm, "log").unwrap();
        for k in 1..=70 {
            lm.append(&make_record(&format!("record{k}"), k + 100)).unwrap();
        }

        let mut it = lm.iter().unwrap();
        for k in (1..=70).rev() {
            let rec = it.next().unwrap();
            let npos = Page::max_length(format!("record{k}").chars().count());
            let p = Page::from_bytes(rec);
            assert_eq!(p.get_string(0), format!("record{k}"));
            assert_eq!(p.get_int(npos), k + 100);
        }
        assert!(it.next().is_none());
    }
}
