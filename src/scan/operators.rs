// The three relational operators built purely on top of the `Scan` trait:
// selection, projection, and cross product. None of them touch storage or
// transactions directly — they only compose other scans.

use super::{Constant, Predicate, Rid, Scan};
use crate::error::Result;

/// Filters an underlying scan to the rows satisfying `pred`. Forwards
/// mutation calls straight through, so it stays updatable whenever the
/// wrapped scan is.
pub struct SelectScan {
    s: Box<dyn Scan>,
    pred: Predicate,
}

impl SelectScan {
    pub fn new(s: Box<dyn Scan>, pred: Predicate) -> Self {
        Self { s, pred }
    }
}

impl Scan for SelectScan {
    fn before_first(&mut self) -> Result<()> {
        self.s.before_first()
    }

    fn next(&mut self) -> Result<bool> {
        while self.s.next()? {
            if self.pred.is_satisfied(self.s.as_mut())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get_int(&mut self, fldname: &str) -> Result<i32> {
        self.s.get_int(fldname)
    }

    fn get_string(&mut self, fldname: &str) -> Result<String> {
        self.s.get_string(fldname)
    }

    fn get_val(&mut self, fldname: &str) -> Result<Constant> {
        self.s.get_val(fldname)
    }

    fn has_field(&self, fldname: &str) -> bool {
        self.s.has_field(fldname)
    }

    fn close(&mut self) -> Result<()> {
        self.s.close()
    }

    fn set_int(&mut self, fldname: &str, val: i32) -> Result<()> {
        self.s.set_int(fldname, val)
    }

    fn set_string(&mut self, fldname: &str, val: &str) -> Result<()> {
        self.s.set_string(fldname, val)
    }

    fn set_val(&mut self, fldname: &str, val: Constant) -> Result<()> {
        self.s.set_val(fldname, val)
    }

    fn insert(&mut self) -> Result<()> {
        self.s.insert()
    }

    fn delete(&mut self) -> Result<()> {
        self.s.delete()
    }

    fn get_rid(&self) -> Result<Rid> {
        self.s.get_rid()
    }

    fn move_to_rid(&mut self, rid: Rid) -> Result<()> {
        self.s.move_to_rid(rid)
    }
}

/// Restricts an underlying scan to a subset of its fields. Always read-only:
/// even when the wrapped scan is updatable, a projection may drop the
/// columns a caller would need to address a row.
pub struct ProjectScan {
    s: Box<dyn Scan>,
    fieldlist: Vec<String>,
}

impl ProjectScan {
    pub fn new(s: Box<dyn Scan>, fieldlist: Vec<String>) -> Self {
        Self { s, fieldlist }
    }
}

impl Scan for ProjectScan {
    fn before_first(&mut self) -> Result<()> {
        self.s.before_first()
    }

    fn next(&mut self) -> Result<bool> {
        self.s.next()
    }

    fn get_int(&mut self, fldname: &str) -> Result<i32> {
        if self.has_field(fldname) {
            self.s.get_int(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn get_string(&mut self, fldname: &str) -> Result<String> {
        if self.has_field(fldname) {
            self.s.get_string(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn get_val(&mut self, fldname: &str) -> Result<Constant> {
        if self.has_field(fldname) {
            self.s.get_val(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn has_field(&self, fldname: &str) -> bool {
        self.fieldlist.iter().any(|f| f == fldname)
    }

    fn close(&mut self) -> Result<()> {
        self.s.close()
    }
}

/// The cross product of two scans: for every row of `s1`, all rows of `s2`.
pub struct ProductScan {
    s1: Box<dyn Scan>,
    s2: Box<dyn Scan>,
}

impl ProductScan {
    pub fn new(mut s1: Box<dyn Scan>, s2: Box<dyn Scan>) -> Result<Self> {
        s1.next()?;
        Ok(Self { s1, s2 })
    }
}

impl Scan for ProductScan {
    fn before_first(&mut self) -> Result<()> {
        self.s1.before_first()?;
        self.s1.next()?;
        self.s2.before_first()
    }

    fn next(&mut self) -> Result<bool> {
        if self.s2.next()? {
            Ok(true)
        } else {
            self.s2.before_first()?;
            Ok(self.s2.next()? && self.s1.next()?)
        }
    }

    fn get_int(&mut self, fldname: &str) -> Result<i32> {
        if self.s1.has_field(fldname) {
            self.s1.get_int(fldname)
        } else if self.s2.has_field(fldname) {
            self.s2.get_int(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn get_string(&mut self, fldname: &str) -> Result<String> {
        if self.s1.has_field(fldname) {
            self.s1.get_string(fldname)
        } else if self.s2.has_field(fldname) {
            self.s2.get_string(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn get_val(&mut self, fldname: &str) -> Result<Constant> {
        if self.s1.has_field(fldname) {
            self.s1.get_val(fldname)
        } else if self.s2.has_field(fldname) {
            self.s2.get_val(fldname)
        } else {
            Err(crate::error::DbError::Internal(format!("field {fldname} not found")))
        }
    }

    fn has_field(&self, fldname: &str) -> bool {
        self.s1.has_field(fldname) || self.s2.has_field(fldname)
    }

    fn close(&mut self) -> Result<()> {
        self.s1.close()?;
        self.s2.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Layout, Schema};
    use crate::scan::table_scan::TableScan;
    use crate::scan::{Expression, Term};
    use crate::storage::{BufferMgr, FileMgr, LogMgr};
    use crate::transaction::concurrency::LockTable;
    use crate::transaction::Transaction;
    use std::sync::Arc;
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

    fn make_table(tx: &Arc<Transaction>, name: &str, rows: i32) -> Box<dyn Scan> {
        let mut sch = Schema::new();
        sch.add_int_field("A");
        let layout = Arc::new(Layout::from_schema(sch));
        let mut ts = TableScan::new(Arc::clone(tx), name, layout).unwrap();
        for i in 0..rows {
            ts.insert().unwrap();
            ts.set_int("A", i).unwrap();
        }
        ts.before_first().unwrap();
        Box::new(ts)
    }

    #[test]
    fn select_scan_filters_rows() {
        let (_dir, tx) = setup();
        let s = make_table(&tx, "T", 10);
        let pred = Predicate::from_term(Term::new(
            Expression::Field("A".to_string()),
            Expression::Val(Constant::Int(5)),
        ));
        let mut select = SelectScan::new(s, pred);
        select.before_first().unwrap();
        let mut found = Vec::new();
        while select.next().unwrap() {
            found.push(select.get_int("A").unwrap());
        }
        assert_eq!(found, vec![5]);
    }

    #[test]
    fn project_scan_hides_fields() {
        let (_dir, tx) = setup();
        let s = make_table(&tx, "T", 3);
        let mut project = ProjectScan::new(s, vec!["A".to_string()]);
        assert!(project.has_field("A"));
        assert!(!project.has_field("B"));
        assert!(project.get_int("B").is_err());
    }

    #[test]
    fn product_scan_yields_cartesian_pairs() {
        let (_dir, tx) = setup();
        let s1 = make_table(&tx, "T1", 2);
        let s2 = make_table(&tx, "T2", 3);
        let mut product = ProductScan::new(s1, s2).unwrap();
        let mut count = 0;
        while product.next().unwrap() {
            count += 1;
        }
        assert_eq!(count, 6);
    }
}
