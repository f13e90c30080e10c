// Query plans: cost-estimating wrappers around the scan operators. A `Plan`
// never executes anything itself — `open()` builds the scan tree lazily so
// the planner can compare alternatives (block_accessed/records_output)
// before committing to one.

pub mod planner;

use std::sync::Arc;

use crate::catalog::{MetadataMgr, StatInfo};
use crate::error::Result;
use crate::record::{Layout, Schema};
use crate::scan::{Expression, Predicate, ProductScan, ProjectScan, Scan, SelectScan, TableScan, Term};
use crate::transaction::Transaction;

pub trait Plan {
    fn open(&self) -> Result<Box<dyn Scan>>;
    fn block_accessed(&self) -> i32;
    fn records_output(&self) -> i32;
    fn distinct_values(&self, fldname: &str) -> i32;
    fn schema(&self) -> &Schema;
}

/// Leaf plan: one table, read through its catalog layout and statistics.
pub struct TablePlan {
    tx: Arc<Transaction>,
    tblname: String,
    layout: Arc<Layout>,
    si: StatInfo,
}

impl TablePlan {
    pub fn new(tx: Arc<Transaction>, tblname: &str, md: &MetadataMgr) -> Result<Self> {
        let layout = Arc::new(md.get_layout(tblname, &tx)?);
        let si = md.get_stat_info(tblname, &layout, &tx)?;
        Ok(Self {
            tx,
            tblname: tblname.to_string(),
            layout,
            si,
        })
    }
}

impl Plan for TablePlan {
    fn open(&self) -> Result<Box<dyn Scan>> {
        Ok(Box::new(TableScan::new(Arc::clone(&self.tx), &self.tblname, Arc::clone(&self.layout))?))
    }

    fn block_accessed(&self) -> i32 {
        self.si.num_blocks
    }

    fn records_output(&self) -> i32 {
        self.si.num_recs
    }

    fn distinct_values(&self, fldname: &str) -> i32 {
        self.si.distinct_values(fldname)
    }

    fn schema(&self) -> &Schema {
        self.layout.schema()
    }
}

/// Estimates the reduction a predicate applies to its input's row count.
/// Sciore's textbook formula (not present in the port this crate grew from):
/// the product, over every term, of the larger side's estimated distinct
/// value count — two equal constants contribute a factor of 1, two unequal
/// ones make the term unsatisfiable.
fn reduction_factor(pred: &Predicate, p: &dyn Plan) -> i32 {
    pred.terms().iter().map(|t| term_reduction_factor(t, p)).product()
}

fn term_reduction_factor(t: &Term, p: &dyn Plan) -> i32 {
    match (t.lhs.as_field_name(), t.rhs.as_field_name()) {
        (Some(lf), Some(rf)) => p.distinct_values(lf).max(p.distinct_values(rf)),
        (Some(lf), None) => p.distinct_values(lf),
        (None, Some(rf)) => p.distinct_values(rf),
        (None, None) => {
            if let (Expression::Val(l), Expression::Val(r)) = (&t.lhs, &t.rhs) {
                if l == r {
                    1
                } else {
                    i32::MAX
                }
            } else {
                unreachable!("non-field, non-constant expression")
            }
        }
    }
}

/// Filters its input plan's output through a predicate.
pub struct SelectPlan {
    p: Box<dyn Plan>,
    pred: Predicate,
}

impl SelectPlan {
    pub fn new(p: Box<dyn Plan>, pred: Predicate) -> Self {
        Self { p, pred }
    }
}

impl Plan for SelectPlan {
    fn open(&self) -> Result<Box<dyn Scan>> {
        let s = self.p.open()?;
        Ok(Box::new(SelectScan::new(s, self.pred.clone())))
    }

    fn block_accessed(&self) -> i32 {
        self.p.block_accessed()
    }

    fn records_output(&self) -> i32 {
        let factor = reduction_factor(&self.pred, self.p.as_ref());
        if factor == 0 {
            0
        } else {
            self.p.records_output() / factor
        }
    }

    fn distinct_values(&self, fldname: &str) -> i32 {
        if self.pred.equates_with_constant(fldname).is_some() {
            1
        } else if let Some(fldname2) = self.pred.equates_with_field(fldname) {
            self.p.distinct_values(fldname).min(self.p.distinct_values(fldname2))
        } else {
            self.p.distinct_values(fldname)
        }
    }

    fn schema(&self) -> &Schema {
        self.p.schema()
    }
}

/// Restricts its input plan's output to a subset of fields.
pub struct ProjectPlan {
    p: Box<dyn Plan>,
    schema: Schema,
}

impl ProjectPlan {
    pub fn new(p: Box<dyn Plan>, fieldlist: &[String]) -> Self {
        let mut schema = Schema::new();
        for fldname in fieldlist {
            schema.add(fldname, p.schema());
        }
        Self { p, schema }
    }
}

impl Plan for ProjectPlan {
    fn open(&self) -> Result<Box<dyn Scan>> {
        let s = self.p.open()?;
        Ok(Box::new(ProjectScan::new(s, self.schema.fields().to_vec())))
    }

    fn block_accessed(&self) -> i32 {
        self.p.block_accessed()
    }

    fn records_output(&self) -> i32 {
        self.p.records_output()
    }

    fn distinct_values(&self, fldname: &str) -> i32 {
        self.p.distinct_values(fldname)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// The cross product of two plans.
pub struct ProductPlan {
    p1: Box<dyn Plan>,
    p2: Box<dyn Plan>,
    schema: Schema,
}

impl ProductPlan {
    pub fn new(p1: Box<dyn Plan>, p2: Box<dyn Plan>) -> Self {
        let mut schema = Schema::new();
        schema.add_all(p1.schema());
        schema.add_all(p2.schema());
        Self { p1, p2, schema }
    }
}

impl Plan for ProductPlan {
    fn open(&self) -> Result<Box<dyn Scan>> {
        let s1 = self.p1.open()?;
        let s2 = self.p2.open()?;
        Ok(Box::new(ProductScan::new(s1, s2)?))
    }

    fn block_accessed(&self) -> i32 {
        self.p1.block_accessed() + self.p1.records_output() * self.p2.block_accessed()
    }

    fn records_output(&self) -> i32 {
        self.p1.records_output() * self.p2.records_output()
    }

    fn distinct_values(&self, fldname: &str) -> i32 {
        if self.p1.schema().has_field(fldname) {
            self.p1.distinct_values(fldname)
        } else {
            self.p2.distinct_values(fldname)
        }
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
