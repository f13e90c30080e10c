// Slotted page: each block of a table file is divided into fixed-size slots,
// each holding one flag word (EMPTY/USED) followed by the row's fields.

use std::sync::Arc;

use super::{Layout, Types};
use crate::error::Result;
use crate::storage::BlockId;
use crate::transaction::Transaction;

const EMPTY: i32 = 0;
const USED: i32 = 1;

/// Reads and writes the rows of one block under a fixed `Layout`.
pub struct RecordPage {
    tx: Arc<Transaction>,
    blk: BlockId,
    layout: Arc<Layout>,
}

impl RecordPage {
    pub fn new(tx: Arc<Transaction>, blk: BlockId, layout: Arc<Layout>) -> Result<Self> {
        tx.pin(&blk)?;
        Ok(Self { tx, blk, layout })
    }

    pub fn block(&self) -> &BlockId {
        &self.blk
    }

    pub fn get_int(&self, slot: i32, fldname: &str) -> Result<i32> {
        let fldpos = self.offset(slot) + self.layout.offset(fldname);
        self.tx.get_int(&self.blk, fldpos)
    }

    pub fn get_string(&self, slot: i32, fldname: &str) -> Result<String> {
        let fldpos = self.offset(slot) + self.layout.offset(fldname);
        self.tx.get_string(&self.blk, fldpos)
    }

    pub fn set_int(&self, slot: i32, fldname: &str, val: i32) -> Result<()> {
        let fldpos = self.offset(slot) + self.layout.offset(fldname);
        self.tx.set_int(&self.blk, fldpos, val, true)
    }

    pub fn set_string(&self, slot: i32, fldname: &str, val: &str) -> Result<()> {
        let fldpos = self.offset(slot) + self.layout.offset(fldname);
        self.tx.set_string(&self.blk, fldpos, val, true)
    }

    pub fn delete(&self, slot: i32) -> Result<()> {
        self.set_flag(slot, EMPTY)
    }

    /// Initializes every slot in the block to EMPTY with zeroed fields.
    /// Not logged: a freshly appended block has no prior state to undo to.
    pub fn format(&self) -> Result<()> {
        let mut slot = 0;
        while self.is_valid_slot(slot) {
            self.tx.set_int(&self.blk, self.offset(slot), EMPTY, false)?;
            let schema = self.layout.schema().clone();
            for fldname in schema.fields() {
                let fldpos = self.offset(slot) + self.layout.offset(fldname);
                match schema.field_type(fldname) {
                    Types::Integer => self.tx.set_int(&self.blk, fldpos, 0, false)?,
                    Types::Varchar => self.tx.set_string(&self.blk, fldpos, "", false)?,
                }
            }
            slot += 1;
        }
        Ok(())
    }

    pub fn next_after(&self, slot: i32) -> Result<i32> {
        self.search_after(slot, USED)
    }

    pub fn insert_after(&self, slot: i32) -> Result<i32> {
        let newslot = self.search_after(slot, EMPTY)?;
        if newslot >= 0 {
            self.set_flag(newslot, USED)?;
        }
        Ok(newslot)
    }

    fn set_flag(&self, slot: i32, flag: i32) -> Result<()> {
        self.tx.set_int(&self.blk, self.offset(slot), flag, true)
    }

    fn search_after(&self, mut slot: i32, flag: i32) -> Result<i32> {
        slot += 1;
        while self.is_valid_slot(slot) {
            if self.tx.get_int(&self.blk, self.offset(slot))? == flag {
                return Ok(slot);
            }
            slot += 1;
        }
        Ok(-1)
    }

    fn is_valid_slot(&self, slot: i32) -> bool {
        self.offset(slot + 1) <= self.tx.block_size()
    }

    fn offset(&self, slot: i32) -> usize {
        slot as usize * self.layout.slot_size()
    }
}
