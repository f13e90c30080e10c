// Leaf scan over one table's `.tbl` file: walks slotted blocks in order,
// extending the file with a freshly formatted block when an insert has
// nowhere to go.

use std::sync::Arc;

use super::{Constant, Rid, Scan};
use crate::error::Result;
use crate::record::{Layout, RecordPage, Types};
use crate::storage::BlockId;
use crate::transaction::Transaction;

pub struct TableScan {
    tx: Arc<Transaction>,
    layout: Arc<Layout>,
    rp: Option<RecordPage>,
    filename: String,
    currentslot: i32,
}

impl TableScan {
    pub fn new(tx: Arc<Transaction>, tblname: &str, layout: Arc<Layout>) -> Result<Self> {
        let filename = format!("{tblname}.tbl");
        let mut scan = Self {
            tx,
            layout,
            rp: None,
            filename,
            currentslot: -1,
        };
        if scan.tx.size(&scan.filename)? == 0 {
            scan.move_to_new_block()?;
        } else {
            scan.move_to_block(0)?;
        }
        Ok(scan)
    }

    fn rp(&self) -> &RecordPage {
        self.rp.as_ref().expect("table scan has no current block")
    }

    fn move_to_block(&mut self, blknum: i32) -> Result<()> {
        self.close()?;
        let blk = BlockId::new(self.filename.clone(), blknum);
        self.rp = Some(RecordPage::new(Arc::clone(&self.tx), blk, Arc::clone(&self.layout))?);
        self.currentslot = -1;
        Ok(())
    }

    fn move_to_new_block(&mut self) -> Result<()> {
        self.close()?;
        let blk = self.tx.append(&self.filename)?;
        let rp = RecordPage::new(Arc::clone(&self.tx), blk, Arc::clone(&self.layout))?;
        rp.format()?;
        self.rp = Some(rp);
        self.currentslot = -1;
        Ok(())
    }

    fn at_last_block(&self) -> Result<bool> {
        Ok(self.rp().block().blknum == self.tx.size(&self.filename)? as i32 - 1)
    }
}

impl Scan for TableScan {
    fn before_first(&mut self) -> Result<()> {
        self.move_to_block(0)
    }

    fn next(&mut self) -> Result<bool> {
        self.currentslot = self.rp().next_after(self.currentslot)?;
        while self.currentslot < 0 {
            if self.at_last_block()? {
                return Ok(false);
            }
            let nextblk = self.rp().block().blknum + 1;
            self.move_to_block(nextblk)?;
            self.currentslot = self.rp().next_after(self.currentslot)?;
        }
        Ok(true)
    }

    fn get_int(&mut self, fldname: &str) -> Result<i32> {
        self.rp().get_int(self.currentslot, fldname)
    }

    fn get_string(&mut self, fldname: &str) -> Result<String> {
        self.rp().get_string(self.currentslot, fldname)
    }

    fn get_val(&mut self, fldname: &str) -> Result<Constant> {
        match self.layout.schema().field_type(fldname) {
            Types::Integer => Ok(Constant::Int(self.get_int(fldname)?)),
            Types::Varchar => Ok(Constant::Str(self.get_string(fldname)?)),
        }
    }

    fn has_field(&self, fldname: &str) -> bool {
        self.layout.schema().has_field(fldname)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(rp) = &self.rp {
            self.tx.unpin(rp.block());
        }
        Ok(())
    }

    fn set_int(&mut self, fldname: &str, val: i32) -> Result<()> {
        self.rp().set_int(self.currentslot, fldname, val)
    }

    fn set_string(&mut self, fldname: &str, val: &str) -> Result<()> {
        self.rp().set_string(self.currentslot, fldname, val)
    }

    fn set_val(&mut self, fldname: &str, val: Constant) -> Result<()> {
        match val {
            Constant::Int(i) => self.set_int(fldname, i),
            Constant::Str(s) => self.set_string(fldname, &s),
        }
    }

    fn insert(&mut self) -> Result<()> {
        self.currentslot = self.rp().insert_after(self.currentslot)?;
        while self.currentslot < 0 {
            if self.at_last_block()? {
                self.move_to_new_block()?;
            } else {
                let nextblk = self.rp().block().blknum + 1;
                self.move_to_block(nextblk)?;
            }
            self.currentslot = self.rp().insert_after(self.currentslot)?;
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        self.rp().delete(self.currentslot)
    }

    fn get_rid(&self) -> Result<Rid> {
        Ok(Rid::new(self.rp().block().blknum, self.currentslot))
    }

    fn move_to_rid(&mut self, rid: Rid) -> Result<()> {
        self.close()?;
        let blk = BlockId::new(self.filename.clone(), rid.blknum);
        self.rp = Some(RecordPage::new(Arc::clone(&self.tx), blk, Arc::clone(&self.layout))?);
        self.currentslot = rid.slot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Schema;
    use crate::storage::{BufferMgr, FileMgr, LogMgr};
    use crate::transaction::concurrency::LockTable;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Transaction>) {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "log").unwrap());
        let bm = Arc::new(BufferMgr::new(Arc::clone(&fm), Arc::clone(&lm), 8, Duration::from_millis(500)));
        let lt = Arc::new(LockTable::new(Duration::from_millis(500)));
        let tx = Arc::new(Transaction::new(fm, lm, bm, lt).unwrap());
        (dir, tx)
    }

    #[test]
    fn insert_and_scan_rows_in_order() {
        let (_dir, tx) = setup();
        let mut sch = Schema::new();
        sch.add_int_field("A");
        sch.add_string_field("B", 9);
        let layout = Arc::new(Layout::from_schema(sch));

        let mut ts = TableScan::new(Arc::clone(&tx), "T", layout).unwrap();
        for i in 0..20 {
            ts.insert().unwrap();
            ts.set_int("A", i).unwrap();
            ts.set_string("B", &format!("rec{i}")).unwrap();
        }

        ts.before_first().unwrap();
        let mut count = 0;
        while ts.next().unwrap() {
            assert_eq!(ts.get_int("A").unwrap(), count);
            assert_eq!(ts.get_string("B").unwrap(), format!("rec{count}"));
            count += 1;
        }
        assert_eq!(count, 20);
        ts.close().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn delete_removes_matching_rows() {
        let (_dir, tx) = setup();
        let mut sch = Schema::new();
        sch.add_int_field("A");
        let layout = Arc::new(Layout::from_schema(sch));
        let mut ts = TableScan::new(Arc::clone(&tx), "T", layout).unwrap();
        for i in 0..10 {
            ts.insert().unwrap();
            ts.set_int("A", i).unwrap();
        }

        ts.before_first().unwrap();
        while ts.next().unwrap() {
            if ts.get_int("A").unwrap() % 2 == 0 {
                ts.delete().unwrap();
            }
        }

        ts.before_first().unwrap();
        let mut remaining = Vec::new();
        while ts.next().unwrap() {
            remaining.push(ts.get_int("A").unwrap());
        }
        assert_eq!(remaining, vec![1, 3, 5, 7, 9]);
        ts.close().unwrap();
        tx.commit().unwrap();
    }
}
