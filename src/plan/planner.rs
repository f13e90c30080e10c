// Planners translate parsed SQL into `Plan` trees (queries) or execute
// directly against the metadata manager (updates/DDL).

use std::sync::Arc;

use super::{Plan, ProductPlan, ProjectPlan, SelectPlan, TablePlan};
use crate::catalog::MetadataMgr;
use crate::error::Result;
use crate::parser::{self, CreateIndexData, CreateTableData, CreateViewData, DeleteData, InsertData, ModifyData, QueryData, UpdateCmd};
use crate::transaction::Transaction;

pub trait QueryPlanner {
    fn create_plan(&self, data: &QueryData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<Box<dyn Plan>>;
}

/// Builds a left-deep plan in table-list order with no cost-based choices:
/// product the tables together in order, then select, then project.
pub struct BasicQueryPlanner;

impl QueryPlanner for BasicQueryPlanner {
    fn create_plan(&self, data: &QueryData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<Box<dyn Plan>> {
        let mut plans: Vec<Box<dyn Plan>> = Vec::new();
        for tblname in &data.tables {
            plans.push(plan_for_table(tblname, tx, mdm, self)?);
        }
        let mut iter = plans.into_iter();
        let mut p = iter.next().ok_or_else(|| crate::error::DbError::BadSyntax("query has no tables".to_string()))?;
        for next in iter {
            p = Box::new(ProductPlan::new(p, next));
        }
        let p: Box<dyn Plan> = Box::new(SelectPlan::new(p, data.pred.clone()));
        Ok(Box::new(ProjectPlan::new(p, &data.fields)))
    }
}

/// Same as `BasicQueryPlanner`, but at each join step picks whichever of
/// `ProductPlan(next, acc)` / `ProductPlan(acc, next)` scans fewer blocks.
pub struct BetterQueryPlanner;

impl QueryPlanner for BetterQueryPlanner {
    fn create_plan(&self, data: &QueryData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<Box<dyn Plan>> {
        let mut plans: Vec<Box<dyn Plan>> = Vec::new();
        for tblname in &data.tables {
            plans.push(plan_for_table(tblname, tx, mdm, self)?);
        }
        let mut iter = plans.into_iter();
        let mut p = iter.next().ok_or_else(|| crate::error::DbError::BadSyntax("query has no tables".to_string()))?;
        for next in iter {
            p = choose_cheaper_product(next, p);
        }
        let p: Box<dyn Plan> = Box::new(SelectPlan::new(p, data.pred.clone()));
        Ok(Box::new(ProjectPlan::new(p, &data.fields)))
    }
}

/// `Plan` boxes aren't `Clone`, so rather than building both orderings and
/// discarding one, this computes each ordering's `block_accessed` cost
/// directly from the two candidates and only constructs the cheaper one.
fn choose_cheaper_product(next: Box<dyn Plan>, acc: Box<dyn Plan>) -> Box<dyn Plan> {
    let next_blocks = next.block_accessed();
    let next_records = next.records_output();
    let acc_blocks = acc.block_accessed();
    let acc_records = acc.records_output();

    let next_first_cost = next_blocks + next_records * acc_blocks;
    let acc_first_cost = acc_blocks + acc_records * next_blocks;

    if next_first_cost < acc_first_cost {
        Box::new(ProductPlan::new(next, acc))
    } else {
        Box::new(ProductPlan::new(acc, next))
    }
}

fn plan_for_table(tblname: &str, tx: &Arc<Transaction>, mdm: &MetadataMgr, planner: &dyn QueryPlanner) -> Result<Box<dyn Plan>> {
    if let Ok(viewdef) = mdm.get_view_def(tblname, tx) {
        let viewdata = parser::parse_query(&viewdef)?;
        planner.create_plan(&viewdata, tx, mdm)
    } else {
        Ok(Box::new(TablePlan::new(Arc::clone(tx), tblname, mdm)?))
    }
}

pub trait UpdatePlanner {
    fn execute_insert(&self, data: &InsertData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
    fn execute_delete(&self, data: &DeleteData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
    fn execute_modify(&self, data: &ModifyData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
    fn execute_create_table(&self, data: &CreateTableData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
    fn execute_create_view(&self, data: &CreateViewData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
    fn execute_create_index(&self, data: &CreateIndexData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32>;
}

/// Executes updates directly (no cost-based planning needed for a single
/// table scan).
pub struct BasicUpdatePlanner;

impl UpdatePlanner for BasicUpdatePlanner {
    fn execute_insert(&self, data: &InsertData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        let p = TablePlan::new(Arc::clone(tx), &data.tblname, mdm)?;
        let mut us = p.open()?;
        us.insert()?;
        for (fldname, val) in data.flds.iter().zip(data.vals.iter()) {
            us.set_val(fldname, val.clone())?;
        }
        us.close()?;
        Ok(1)
    }

    fn execute_delete(&self, data: &DeleteData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        let p = TablePlan::new(Arc::clone(tx), &data.tblname, mdm)?;
        let p = SelectPlan::new(Box::new(p), data.pred.clone());
        let mut us = p.open()?;
        let mut count = 0;
        while us.next()? {
            us.delete()?;
            count += 1;
        }
        us.close()?;
        Ok(count)
    }

    fn execute_modify(&self, data: &ModifyData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        let p = TablePlan::new(Arc::clone(tx), &data.tblname, mdm)?;
        let p = SelectPlan::new(Box::new(p), data.pred.clone());
        let mut us = p.open()?;
        let mut count = 0;
        while us.next()? {
            let val = data.newval.evaluate(us.as_mut())?;
            us.set_val(&data.fldname, val)?;
            count += 1;
        }
        us.close()?;
        Ok(count)
    }

    fn execute_create_table(&self, data: &CreateTableData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        mdm.create_table(&data.tblname, &data.sch, tx)?;
        Ok(0)
    }

    fn execute_create_view(&self, data: &CreateViewData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        mdm.create_view(&data.viewname, &data.qrydata.to_string(), tx)?;
        Ok(0)
    }

    fn execute_create_index(&self, data: &CreateIndexData, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        mdm.create_index(&data.idxname, &data.tblname, &data.fldname, tx)?;
        Ok(0)
    }
}

/// Top-level entry point: parses a command and routes it to the query or
/// update planner.
pub struct Planner {
    qplanner: Box<dyn QueryPlanner + Send + Sync>,
    uplanner: Box<dyn UpdatePlanner + Send + Sync>,
}

impl Planner {
    pub fn new(qplanner: Box<dyn QueryPlanner + Send + Sync>, uplanner: Box<dyn UpdatePlanner + Send + Sync>) -> Self {
        Self { qplanner, uplanner }
    }

    pub fn create_query_plan(&self, cmd: &str, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<Box<dyn Plan>> {
        let data = parser::parse_query(cmd)?;
        self.qplanner.create_plan(&data, tx, mdm)
    }

    pub fn execute_update(&self, cmd: &str, tx: &Arc<Transaction>, mdm: &MetadataMgr) -> Result<i32> {
        match parser::parse_update_cmd(cmd)? {
            UpdateCmd::Insert(data) => self.uplanner.execute_insert(&data, tx, mdm),
            UpdateCmd::Delete(data) => self.uplanner.execute_delete(&data, tx, mdm),
            UpdateCmd::Modify(data) => self.uplanner.execute_modify(&data, tx, mdm),
            UpdateCmd::CreateTable(data) => self.uplanner.execute_create_table(&data, tx, mdm),
            UpdateCmd::CreateView(data) => self.uplanner.execute_create_view(&data, tx, mdm),
            UpdateCmd::CreateIndex(data) => self.uplanner.execute_create_index(&data, tx, mdm),
        }
    }
}
