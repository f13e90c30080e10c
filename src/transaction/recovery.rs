// Undo-only, no-redo recovery. Every committed transaction forces its dirty
// buffers to disk before writing COMMIT, so redo is never needed;
// `recover()` only has to undo whatever was left uncommitted when the
// process died.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{BlockId, BufferMgr, LogMgr, Page};

use super::Transaction;

const CHECKPOINT: i32 = 0;
const START: i32 = 1;
const COMMIT: i32 = 2;
const ROLLBACK: i32 = 3;
const SETINT: i32 = 4;
const SETSTRING: i32 = 5;

/// One decoded entry from the log.
#[derive(Debug, Clone)]
pub enum LogRecord {
    Checkpoint,
    Start { txnum: i64 },
    Commit { txnum: i64 },
    Rollback { txnum: i64 },
    SetInt {
        txnum: i64,
        blk: BlockId,
        offset: usize,
        oldval: i32,
    },
    SetString {
        txnum: i64,
        blk: BlockId,
        offset: usize,
        oldval: String,
    },
}

impl LogRecord {
    pub fn tx_number(&self) -> i64 {
        match self {
            LogRecord::Checkpoint => -1,
            LogRecord::Start { txnum }
            | LogRecord::Commit { txnum }
            | LogRecord::Rollback { txnum }
            | LogRecord::SetInt { txnum, .. }
            | LogRecord::SetString { txnum, .. } => *txnum,
        }
    }

    /// Replays the pre-image this record captured. Only `SetInt`/`SetString`
    /// do anything; the rest are no-ops.
    pub fn undo(&self, tx: &Transaction) -> Result<()> {
        match self {
            LogRecord::SetInt {
                blk, offset, oldval, ..
            } => {
                tx.pin(blk)?;
                tx.set_int(blk, *offset, *oldval, false)?;
                tx.unpin(blk);
            }
            LogRecord::SetString {
                blk, offset, oldval, ..
            } => {
                tx.pin(blk)?;
                tx.set_string(blk, *offset, oldval, false)?;
                tx.unpin(blk);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let p = Page::from_bytes(bytes.to_vec());
        match p.get_int(0) {
            CHECKPOINT => LogRecord::Checkpoint,
            START => LogRecord::Start { txnum: p.get_int(4) as i64 },
            COMMIT => LogRecord::Commit { txnum: p.get_int(4) as i64 },
            ROLLBACK => LogRecord::Rollback { txnum: p.get_int(4) as i64 },
            SETINT => {
                let txnum = p.get_int(4) as i64;
                let filename = p.get_string(8);
                let bpos = 8 + Page::max_length(filename.chars().count());
                let blknum = p.get_int(bpos);
                let opos = bpos + 4;
                let offset = p.get_int(opos) as usize;
                let vpos = opos + 4;
                let oldval = p.get_int(vpos);
                LogRecord::SetInt {
                    txnum,
                    blk: BlockId::new(filename, blknum),
                    offset,
                    oldval,
                }
            }
            SETSTRING => {
                let txnum = p.get_int(4) as i64;
                let filename = p.get_string(8);
                let bpos = 8 + Page::max_length(filename.chars().count());
                let blknum = p.get_int(bpos);
                let opos = bpos + 4;
                let offset = p.get_int(opos) as usize;
                let vpos = opos + 4;
                let oldval = p.get_string(vpos);
                LogRecord::SetString {
                    txnum,
                    blk: BlockId::new(filename, blknum),
                    offset,
                    oldval,
                }
            }
            other => panic!("unknown log record opcode {other}"),
        }
    }

    fn write_checkpoint(lm: &LogMgr) -> Result<u64> {
        let mut p = Page::new(4);
        p.set_int(0, CHECKPOINT);
        lm.append(p.contents())
    }

    fn write_start(lm: &LogMgr, txnum: i64) -> Result<u64> {
        let mut p = Page::new(8);
        p.set_int(0, START);
        p.set_int(4, txnum as i32);
        lm.append(p.contents())
    }

    fn write_commit(lm: &LogMgr, txnum: i64) -> Result<u64> {
        let mut p = Page::new(8);
        p.set_int(0, COMMIT);
        p.set_int(4, txnum as i32);
        lm.append(p.contents())
    }

    fn write_rollback(lm: &LogMgr, txnum: i64) -> Result<u64> {
        let mut p = Page::new(8);
        p.set_int(0, ROLLBACK);
        p.set_int(4, txnum as i32);
        lm.append(p.contents())
    }

    fn write_set_int(
        lm: &LogMgr,
        txnum: i64,
        blk: &BlockId,
        offset: usize,
        oldval: i32,
    ) -> Result<u64> {
        let fpos = 8;
        let bpos = fpos + Page::max_length(blk.filename.chars().count());
        let opos = bpos + 4;
        let vpos = opos + 4;
        let mut p = Page::new(vpos + 4);
        p.set_int(0, SETINT);
        p.set_int(4, txnum as i32);
        p.set_string(fpos, &blk.filename);
        p.set_int(bpos, blk.blknum);
        p.set_int(opos, offset as i32);
        p.set_int(vpos, oldval);
        lm.append(p.contents())
    }

    fn write_set_string(
        lm: &LogMgr,
        txnum: i64,
        blk: &BlockId,
        offset: usize,
        oldval: &str,
    ) -> Result<u64> {
        let fpos = 8;
        let bpos = fpos + Page::max_length(blk.filename.chars().count());
        let opos = bpos + 4;
        let vpos = opos + 4;
        let reclen = vpos + Page::max_length(oldval.chars().count());
        let mut p = Page::new(reclen);
        p.set_int(0, SETSTRING);
        p.set_int(4, txnum as i32);
        p.set_string(fpos, &blk.filename);
        p.set_int(bpos, blk.blknum);
        p.set_int(opos, offset as i32);
        p.set_string(vpos, oldval);
        lm.append(p.contents())
    }
}

/// One `RecoveryMgr` per transaction; constructed inside `Transaction::new`,
/// which immediately writes a START record.
pub struct RecoveryMgr {
    lm: Arc<LogMgr>,
    bm: Arc<BufferMgr>,
    txnum: i64,
}

impl RecoveryMgr {
    pub fn new(txnum: i64, lm: Arc<LogMgr>, bm: Arc<BufferMgr>) -> Result<Self> {
        LogRecord::write_start(&lm, txnum)?;
        Ok(Self { lm, bm, txnum })
    }

    /// Pre-image logging: called *before* the page is mutated.
    pub fn set_int(&self, buff_idx: usize, offset: usize, blk: &BlockId) -> Result<u64> {
        let oldval = self.bm.with_buffer(buff_idx, |b| b.contents().get_int(offset));
        LogRecord::write_set_int(&self.lm, self.txnum, blk, offset, oldval)
    }

    pub fn set_string(&self, buff_idx: usize, offset: usize, blk: &BlockId) -> Result<u64> {
        let oldval = self.bm.with_buffer(buff_idx, |b| b.contents().get_string(offset));
        LogRecord::write_set_string(&self.lm, self.txnum, blk, offset, &oldval)
    }

    pub fn commit(&self) -> Result<()> {
        self.bm.flush_all(self.txnum)?;
        let lsn = LogRecord::write_commit(&self.lm, self.txnum)?;
        self.lm.flush(lsn)
    }

    pub fn rollback(&self, tx: &Transaction) -> Result<()> {
        for bytes in self.lm.iter()? {
            let rec = LogRecord::decode(&bytes);
            if rec.tx_number() == self.txnum {
                if matches!(rec, LogRecord::Start { .. }) {
                    break;
                }
                rec.undo(tx)?;
            }
        }
        self.bm.flush_all(self.txnum)?;
        let lsn = LogRecord::write_rollback(&self.lm, self.txnum)?;
        self.lm.flush(lsn)
    }

    /// Startup recovery: undo everything not in the committed/rolled-back
    /// set, stopping at the first checkpoint, then write a fresh checkpoint.
    pub fn recover(&self, tx: &Transaction) -> Result<()> {
        let mut finished = std::collections::HashSet::new();
        for bytes in self.lm.iter()? {
            let rec = LogRecord::decode(&bytes);
            match rec {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { txnum } | LogRecord::Rollback { txnum } => {
                    finished.insert(txnum);
                }
                ref other => {
                    if !finished.contains(&other.tx_number()) {
                        other.undo(tx)?;
                    }
                }
            }
        }
        self.bm.flush_all(self.txnum)?;
        let lsn = LogRecord::write_checkpoint(&self.lm)?;
        self.lm.flush(lsn)
    }
}
