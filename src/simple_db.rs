// Top-level facade wiring storage, transactions, catalog, and planning into
// one handle; runs recovery against an existing database before accepting
// new transactions.

use std::sync::Arc;

use crate::catalog::MetadataMgr;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::plan::planner::{BasicUpdatePlanner, BetterQueryPlanner, Planner};
use crate::plan::Plan;
use crate::storage::{BufferMgr, FileMgr, LogMgr};
use crate::transaction::concurrency::LockTable;
use crate::transaction::Transaction;

pub struct SimpleDb {
    fm: Arc<FileMgr>,
    lm: Arc<LogMgr>,
    bm: Arc<BufferMgr>,
    locktable: Arc<LockTable>,
    mdm: MetadataMgr,
    planner: Planner,
}

impl SimpleDb {
    /// Opens (or creates) the database directory named by `config.data_dir`,
    /// recovering from the log before returning if it already existed.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let fm = Arc::new(FileMgr::new(&config.data_dir, config.block_size)?);
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), &config.log_file)?);
        let bm = Arc::new(BufferMgr::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            config.buffer_pool_size,
            config.max_time,
        ));
        let locktable = Arc::new(LockTable::new(config.max_time));

        let is_new = fm.is_new();
        let tx = Arc::new(Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&locktable))?);
        if is_new {
            tracing::info!("creating new database at {}", config.data_dir);
        } else {
            tracing::info!("recovering existing database at {}", config.data_dir);
            tx.recover()?;
        }
        let mdm = MetadataMgr::new(is_new, &tx)?;
        tx.commit()?;

        let planner = Planner::new(Box::new(BetterQueryPlanner), Box::new(BasicUpdatePlanner));

        Ok(Self {
            fm,
            lm,
            bm,
            locktable,
            mdm,
            planner,
        })
    }

    pub fn new_tx(&self) -> Result<Arc<Transaction>> {
        Ok(Arc::new(Transaction::new(
            Arc::clone(&self.fm),
            Arc::clone(&self.lm),
            Arc::clone(&self.bm),
            Arc::clone(&self.locktable),
        )?))
    }

    pub fn metadata(&self) -> &MetadataMgr {
        &self.mdm
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Parses and plans `sql` as a query, returning the resulting plan tree.
    /// The caller opens it and owns the transaction's lifetime.
    pub fn create_query_plan(&self, sql: &str, tx: &Arc<Transaction>) -> Result<Box<dyn Plan>> {
        self.planner.create_query_plan(sql, tx, &self.mdm)
    }

    /// Parses and executes `sql` as an insert/delete/update/DDL statement,
    /// returning the number of affected rows (0 for DDL).
    pub fn execute_update(&self, sql: &str, tx: &Arc<Transaction>) -> Result<i32> {
        self.planner.execute_update(sql, tx, &self.mdm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig {
            data_dir: dir.path().join("db").to_string_lossy().to_string(),
            log_file: "simpledb.log".to_string(),
            block_size: 512,
            buffer_pool_size: 8,
            max_time: std::time::Duration::from_secs(2),
        }
    }

    #[test]
    fn end_to_end_create_insert_select() {
        let dir = TempDir::new().unwrap();
        let db = SimpleDb::new(&test_config(&dir)).unwrap();

        let tx = db.new_tx().unwrap();
        db.execute_update("create table student (sname varchar(32), gradyear int)", &tx).unwrap();
        db.execute_update("insert into student (sname, gradyear) values ('joe', 2021)", &tx).unwrap();
        db.execute_update("insert into student (sname, gradyear) values ('amy', 2020)", &tx).unwrap();
        tx.commit().unwrap();

        let tx2 = db.new_tx().unwrap();
        let plan = db.create_query_plan("select sname, gradyear from student", &tx2).unwrap();
        let mut scan = plan.open().unwrap();
        let mut rows = Vec::new();
        while scan.next().unwrap() {
            rows.push((scan.get_string("sname").unwrap(), scan.get_int("gradyear").unwrap()));
        }
        scan.close().unwrap();
        tx2.commit().unwrap();

        assert_eq!(rows, vec![("joe".to_string(), 2021), ("amy".to_string(), 2020)]);
    }

    #[test]
    fn reopening_an_existing_database_recovers() {
        let dir = TempDir::new().unwrap();
        {
            let db = SimpleDb::new(&test_config(&dir)).unwrap();
            let tx = db.new_tx().unwrap();
            db.execute_update("create table t (a int)", &tx).unwrap();
            db.execute_update("insert into t (a) values (1)", &tx).unwrap();
            tx.commit().unwrap();
        }
        let db2 = SimpleDb::new(&test_config(&dir)).unwrap();
        let tx = db2.new_tx().unwrap();
        let plan = db2.create_query_plan("select a from t", &tx).unwrap();
        let mut scan = plan.open().unwrap();
        assert!(scan.next().unwrap());
        assert_eq!(scan.get_int("a").unwrap(), 1);
        scan.close().unwrap();
        tx.commit().unwrap();
    }
}
