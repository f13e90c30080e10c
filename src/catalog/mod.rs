// Catalog-as-ordinary-tables: schema and statistics metadata lives in four
// regular tables (tblcat, fldcat, viewcat, idxcat), read and written through
// the same `TableScan` every other table uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{DbError, Result};
use crate::record::{Layout, Schema, Types};
use crate::scan::{Scan, TableScan};
use crate::transaction::Transaction;

/// Max length, in characters, of a table/field/view/index name.
pub const MAX_NAME: usize = 16;
/// Max length, in characters, of a stored view definition string.
pub const MAX_VIEWDEF: usize = 100;

/// Creates and looks up table layouts, backed by the `tblcat`/`fldcat` tables.
pub struct TableMgr {
    tcat_layout: Arc<Layout>,
    fcat_layout: Arc<Layout>,
}

impl TableMgr {
    pub fn new(is_new: bool, tx: &Arc<Transaction>) -> Result<Self> {
        let mut tcat_schema = Schema::new();
        tcat_schema.add_string_field("tblname", MAX_NAME);
        tcat_schema.add_int_field("slotsize");
        let tcat_layout = Arc::new(Layout::from_schema(tcat_schema.clone()));

        let mut fcat_schema = Schema::new();
        fcat_schema.add_string_field("tblname", MAX_NAME);
        fcat_schema.add_string_field("fldname", MAX_NAME);
        fcat_schema.add_int_field("type");
        fcat_schema.add_int_field("length");
        fcat_schema.add_int_field("offset");
        let fcat_layout = Arc::new(Layout::from_schema(fcat_schema.clone()));

        let mgr = Self {
            tcat_layout,
            fcat_layout,
        };
        if is_new {
            mgr.create_table("tblcat", &tcat_schema, tx)?;
            mgr.create_table("fldcat", &fcat_schema, tx)?;
        }
        Ok(mgr)
    }

    pub fn create_table(&self, tblname: &str, sch: &Schema, tx: &Arc<Transaction>) -> Result<()> {
        let layout = Layout::from_schema(sch.clone());

        let mut tcat = TableScan::new(Arc::clone(tx), "tblcat", Arc::clone(&self.tcat_layout))?;
        tcat.insert()?;
        tcat.set_string("tblname", tblname)?;
        tcat.set_int("slotsize", layout.slot_size() as i32)?;
        tcat.close()?;

        let mut fcat = TableScan::new(Arc::clone(tx), "fldcat", Arc::clone(&self.fcat_layout))?;
        for fldname in sch.fields() {
            fcat.insert()?;
            fcat.set_string("tblname", tblname)?;
            fcat.set_string("fldname", fldname)?;
            fcat.set_int("type", sch.field_type(fldname) as i32)?;
            fcat.set_int("length", sch.length(fldname) as i32)?;
            fcat.set_int("offset", layout.offset(fldname) as i32)?;
        }
        fcat.close()?;
        Ok(())
    }

    pub fn get_layout(&self, tblname: &str, tx: &Arc<Transaction>) -> Result<Layout> {
        let mut size: i32 = -1;
        let mut tcat = TableScan::new(Arc::clone(tx), "tblcat", Arc::clone(&self.tcat_layout))?;
        while tcat.next()? {
            if tcat.get_string("tblname")? == tblname {
                size = tcat.get_int("slotsize")?;
                break;
            }
        }
        tcat.close()?;
        if size < 0 {
            return Err(DbError::Catalog(format!("no such table: {tblname}")));
        }

        let mut sch = Schema::new();
        let mut offsets = HashMap::new();
        let mut fcat = TableScan::new(Arc::clone(tx), "fldcat", Arc::clone(&self.fcat_layout))?;
        while fcat.next()? {
            if fcat.get_string("tblname")? == tblname {
                let fldname = fcat.get_string("fldname")?;
                let fldtype = match fcat.get_int("type")? {
                    0 => Types::Integer,
                    1 => Types::Varchar,
                    other => return Err(DbError::Catalog(format!("unknown field type code {other}"))),
                };
                let fldlen = fcat.get_int("length")? as usize;
                let offset = fcat.get_int("offset")? as usize;
                offsets.insert(fldname.clone(), offset);
                sch.add_field(&fldname, fldtype, fldlen);
            }
        }
        fcat.close()?;
        Ok(Layout::new(sch, offsets, size as usize))
    }
}

/// Stores view definitions (the literal SQL text) in the `viewcat` table.
pub struct ViewMgr;

impl ViewMgr {
    pub fn new(is_new: bool, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<Self> {
        if is_new {
            let mut sch = Schema::new();
            sch.add_string_field("viewname", MAX_NAME);
            sch.add_string_field("viewdef", MAX_VIEWDEF);
            tblmgr.create_table("viewcat", &sch, tx)?;
        }
        Ok(Self)
    }

    pub fn create_view(&self, vname: &str, vdef: &str, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<()> {
        let layout = Arc::new(tblmgr.get_layout("viewcat", tx)?);
        let mut ts = TableScan::new(Arc::clone(tx), "viewcat", layout)?;
        ts.insert()?;
        ts.set_string("viewname", vname)?;
        ts.set_string("viewdef", vdef)?;
        ts.close()
    }

    pub fn get_view_def(&self, vname: &str, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<String> {
        let layout = Arc::new(tblmgr.get_layout("viewcat", tx)?);
        let mut ts = TableScan::new(Arc::clone(tx), "viewcat", layout)?;
        let mut result = None;
        while ts.next()? {
            if ts.get_string("viewname")? == vname {
                result = Some(ts.get_string("viewdef")?);
                break;
            }
        }
        ts.close()?;
        result.ok_or_else(|| DbError::Catalog(format!("no such view: {vname}")))
    }
}

/// Crude, non-persisted table statistics: block/record counts refreshed
/// periodically from a full scan of `tblcat`.
#[derive(Debug, Clone, Copy)]
pub struct StatInfo {
    pub num_blocks: i32,
    pub num_recs: i32,
}

impl StatInfo {
    /// A wildly inaccurate but monotonic estimator: query plans only need it
    /// to decrease selectivity as the row count grows, not to be exact.
    pub fn distinct_values(&self, _fldname: &str) -> i32 {
        1 + self.num_recs / 3
    }
}

struct StatState {
    tablestats: HashMap<String, StatInfo>,
    numcalls: u32,
}

/// Refreshes `StatInfo` for every table after every 100 calls to
/// `get_stat_info`, otherwise serving cached values.
pub struct StatMgr {
    state: Mutex<StatState>,
}

impl StatMgr {
    pub fn new(tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<Self> {
        let mgr = Self {
            state: Mutex::new(StatState {
                tablestats: HashMap::new(),
                numcalls: 0,
            }),
        };
        mgr.refresh_statistics(tblmgr, tx)?;
        Ok(mgr)
    }

    pub fn get_stat_info(&self, tblname: &str, layout: &Layout, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<StatInfo> {
        let needs_refresh = {
            let mut state = self.state.lock().unwrap();
            state.numcalls += 1;
            state.numcalls > 100
        };
        if needs_refresh {
            self.refresh_statistics(tblmgr, tx)?;
        }
        let cached = self.state.lock().unwrap().tablestats.get(tblname).copied();
        if let Some(si) = cached {
            return Ok(si);
        }
        let si = Self::calc_table_stats(tblname, layout, tx)?;
        self.state.lock().unwrap().tablestats.insert(tblname.to_string(), si);
        Ok(si)
    }

    fn refresh_statistics(&self, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<()> {
        let mut tablestats = HashMap::new();
        let tcatlayout = tblmgr.get_layout("tblcat", tx)?;
        let mut tcat = TableScan::new(Arc::clone(tx), "tblcat", Arc::new(tcatlayout))?;
        while tcat.next()? {
            let tblname = tcat.get_string("tblname")?;
            let layout = tblmgr.get_layout(&tblname, tx)?;
            let si = Self::calc_table_stats(&tblname, &layout, tx)?;
            tablestats.insert(tblname, si);
        }
        tcat.close()?;
        let mut state = self.state.lock().unwrap();
        state.tablestats = tablestats;
        state.numcalls = 0;
        Ok(())
    }

    fn calc_table_stats(tblname: &str, layout: &Layout, tx: &Arc<Transaction>) -> Result<StatInfo> {
        let mut num_recs = 0;
        let mut num_blocks = 0;
        let mut ts = TableScan::new(Arc::clone(tx), tblname, Arc::new(layout.clone()))?;
        while ts.next()? {
            num_recs += 1;
            num_blocks = ts.get_rid()?.blknum + 1;
        }
        ts.close()?;
        Ok(StatInfo { num_blocks, num_recs })
    }
}

/// Everything a planner needs about one index without opening it: which
/// field it covers, and the table schema/statistics it was built from.
pub struct IndexInfo {
    idxname: String,
    fldname: String,
    tbl_schema: Schema,
    si: StatInfo,
}

impl IndexInfo {
    pub fn new(idxname: String, fldname: String, tbl_schema: Schema, si: StatInfo) -> Self {
        Self {
            idxname,
            fldname,
            tbl_schema,
            si,
        }
    }

    pub fn name(&self) -> &str {
        &self.idxname
    }

    pub fn field_name(&self) -> &str {
        &self.fldname
    }

    pub fn records_output(&self) -> i32 {
        self.si.num_recs / self.si.distinct_values(&self.fldname)
    }

    pub fn distinct_values(&self, fname: &str) -> i32 {
        if self.fldname == fname {
            1
        } else {
            self.si.distinct_values(&self.fldname)
        }
    }

    /// The layout an index file over this field would use: (block, id,
    /// dataval) triples, one per indexed key.
    pub fn index_layout(&self) -> Layout {
        let mut sch = Schema::new();
        sch.add_int_field("block");
        sch.add_int_field("id");
        match self.tbl_schema.field_type(&self.fldname) {
            Types::Integer => sch.add_int_field("dataval"),
            Types::Varchar => {
                let fldlen = self.tbl_schema.length(&self.fldname);
                sch.add_string_field(&self.fldname, fldlen);
            }
        }
        Layout::from_schema(sch)
    }
}

/// Records which indexes exist, backed by the `idxcat` table.
pub struct IndexMgr {
    layout: Arc<Layout>,
}

impl IndexMgr {
    pub fn new(is_new: bool, tblmgr: &TableMgr, tx: &Arc<Transaction>) -> Result<Self> {
        if is_new {
            let mut sch = Schema::new();
            sch.add_string_field("indexname", MAX_NAME);
            sch.add_string_field("tablename", MAX_NAME);
            sch.add_string_field("fieldname", MAX_NAME);
            tblmgr.create_table("idxcat", &sch, tx)?;
        }
        let layout = Arc::new(tblmgr.get_layout("idxcat", tx)?);
        Ok(Self { layout })
    }

    pub fn create_index(&self, idxname: &str, tblname: &str, fldname: &str, tx: &Arc<Transaction>) -> Result<()> {
        let mut ts = TableScan::new(Arc::clone(tx), "idxcat", Arc::clone(&self.layout))?;
        ts.insert()?;
        ts.set_string("indexname", idxname)?;
        ts.set_string("tablename", tblname)?;
        ts.set_string("fieldname", fldname)?;
        ts.close()
    }

    pub fn get_index_info(
        &self,
        tblname: &str,
        tblmgr: &TableMgr,
        statmgr: &StatMgr,
        tx: &Arc<Transaction>,
    ) -> Result<HashMap<String, IndexInfo>> {
        let mut result = HashMap::new();
        let mut ts = TableScan::new(Arc::clone(tx), "idxcat", Arc::clone(&self.layout))?;
        while ts.next()? {
            if ts.get_string("tablename")? == tblname {
                let fldname = ts.get_string("fieldname")?;
                let tbl_layout = tblmgr.get_layout(tblname, tx)?;
                let tblsi = statmgr.get_stat_info(tblname, &tbl_layout, tblmgr, tx)?;
                let ii = IndexInfo::new(ts.get_string("indexname")?, fldname.clone(), tbl_layout.schema().clone(), tblsi);
                result.insert(fldname, ii);
            }
        }
        ts.close()?;
        Ok(result)
    }
}

/// Single entry point into schema, view, statistics, and index metadata.
pub struct MetadataMgr {
    tblmgr: TableMgr,
    viewmgr: ViewMgr,
    statmgr: StatMgr,
    idxmgr: IndexMgr,
}

impl MetadataMgr {
    pub fn new(is_new: bool, tx: &Arc<Transaction>) -> Result<Self> {
        let tblmgr = TableMgr::new(is_new, tx)?;
        let viewmgr = ViewMgr::new(is_new, &tblmgr, tx)?;
        let statmgr = StatMgr::new(&tblmgr, tx)?;
        let idxmgr = IndexMgr::new(is_new, &tblmgr, tx)?;
        Ok(Self {
            tblmgr,
            viewmgr,
            statmgr,
            idxmgr,
        })
    }

    pub fn create_table(&self, tblname: &str, sch: &Schema, tx: &Arc<Transaction>) -> Result<()> {
        self.tblmgr.create_table(tblname, sch, tx)
    }

    pub fn get_layout(&self, tblname: &str, tx: &Arc<Transaction>) -> Result<Layout> {
        self.tblmgr.get_layout(tblname, tx)
    }

    pub fn create_view(&self, viewname: &str, viewdef: &str, tx: &Arc<Transaction>) -> Result<()> {
        self.viewmgr.create_view(viewname, viewdef, &self.tblmgr, tx)
    }

    pub fn get_view_def(&self, viewname: &str, tx: &Arc<Transaction>) -> Result<String> {
        self.viewmgr.get_view_def(viewname, &self.tblmgr, tx)
    }

    pub fn create_index(&self, idxname: &str, tblname: &str, fldname: &str, tx: &Arc<Transaction>) -> Result<()> {
        self.idxmgr.create_index(idxname, tblname, fldname, tx)
    }

    pub fn get_index_info(&self, tblname: &str, tx: &Arc<Transaction>) -> Result<HashMap<String, IndexInfo>> {
        self.idxmgr.get_index_info(tblname, &self.tblmgr, &self.statmgr, tx)
    }

    pub fn get_stat_info(&self, tblname: &str, layout: &Layout, tx: &Arc<Transaction>) -> Result<StatInfo> {
        self.statmgr.get_stat_info(tblname, layout, &self.tblmgr, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BufferMgr, FileMgr, LogMgr};
    use crate::transaction::concurrency::LockTable;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Transaction>) {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 512).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "log").unwrap());
        let bm = Arc::new(BufferMgr::new(Arc::clone(&fm), Arc::clone(&lm), 8, Duration::from_millis(500)));
        let lt = Arc::new(LockTable::new(Duration::from_millis(500)));
        let tx = Arc::new(Transaction::new(fm, lm, bm, lt).unwrap());
        (dir, tx)
    }

    #[test]
    fn create_table_and_recover_its_layout() {
        let (_dir, tx) = setup();
        let mgr = MetadataMgr::new(true, &tx).unwrap();
        let mut sch = Schema::new();
        sch.add_int_field("sid");
        sch.add_string_field("sname", 20);
        mgr.create_table("student", &sch, &tx).unwrap();

        let layout = mgr.get_layout("student", &tx).unwrap();
        assert!(layout.schema().has_field("sid"));
        assert!(layout.schema().has_field("sname"));
        tx.commit().unwrap();
    }

    #[test]
    fn view_definitions_round_trip() {
        let (_dir, tx) = setup();
        let mgr = MetadataMgr::new(true, &tx).unwrap();
        mgr.create_view("myview", "select A from T", &tx).unwrap();
        assert_eq!(mgr.get_view_def("myview", &tx).unwrap(), "select A from T");
        tx.commit().unwrap();
    }

    #[test]
    fn stat_info_reflects_inserted_rows() {
        let (_dir, tx) = setup();
        let mgr = MetadataMgr::new(true, &tx).unwrap();
        let mut sch = Schema::new();
        sch.add_int_field("a");
        mgr.create_table("t", &sch, &tx).unwrap();

        let layout = Arc::new(mgr.get_layout("t", &tx).unwrap());
        let mut ts = TableScan::new(Arc::clone(&tx), "t", layout.clone()).unwrap();
        for i in 0..5 {
            ts.insert().unwrap();
            ts.set_int("a", i).unwrap();
        }
        ts.close().unwrap();

        let si = mgr.get_stat_info("t", &layout, &tx).unwrap();
        assert_eq!(si.num_recs, 5);
        tx.commit().unwrap();
    }
}
