// End-to-end SQL scenario: open a fresh database, create a table, insert a
// couple of rows, and read them back through the planner.

use simpledb_rs::{DatabaseConfig, SimpleDb};
use tempfile::TempDir;

fn open_db(dir: &TempDir) -> SimpleDb {
    let config = DatabaseConfig {
        data_dir: dir.path().join("db").to_string_lossy().to_string(),
        ..DatabaseConfig::default()
    };
    SimpleDb::new(&config).unwrap()
}

#[test]
fn create_insert_select_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    let tx = db.new_tx().unwrap();
    db.execute_update("create table student (sname varchar(32), gradyear int)", &tx)
        .unwrap();
    db.execute_update("insert into student (sname, gradyear) values ('hogetaro', 1993)", &tx)
        .unwrap();
    db.execute_update("insert into student (sname, gradyear) values ('fugataro', 1992)", &tx)
        .unwrap();
    tx.commit().unwrap();

    let tx = db.new_tx().unwrap();
    let plan = db.create_query_plan("select sname, gradyear from student", &tx).unwrap();
    let mut scan = plan.open().unwrap();
    let mut rows = Vec::new();
    while scan.next().unwrap() {
        rows.push((scan.get_string("sname").unwrap(), scan.get_int("gradyear").unwrap()));
    }
    scan.close().unwrap();
    tx.commit().unwrap();

    assert_eq!(rows, vec![("hogetaro".to_string(), 1993), ("fugataro".to_string(), 1992)]);
}

#[test]
fn delete_and_update_affect_matching_rows_only() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    let tx = db.new_tx().unwrap();
    db.execute_update("create table student (sname varchar(32), gradyear int)", &tx)
        .unwrap();
    db.execute_update("insert into student (sname, gradyear) values ('hogetaro', 1993)", &tx)
        .unwrap();
    db.execute_update("insert into student (sname, gradyear) values ('fugataro', 1992)", &tx)
        .unwrap();

    let updated = db
        .execute_update("update student set gradyear = 2000 where sname = 'hogetaro'", &tx)
        .unwrap();
    assert_eq!(updated, 1);

    let deleted = db.execute_update("delete from student where gradyear = 1992", &tx).unwrap();
    assert_eq!(deleted, 1);
    tx.commit().unwrap();

    let tx = db.new_tx().unwrap();
    let plan = db.create_query_plan("select sname, gradyear from student", &tx).unwrap();
    let mut scan = plan.open().unwrap();
    let mut rows = Vec::new();
    while scan.next().unwrap() {
        rows.push((scan.get_string("sname").unwrap(), scan.get_int("gradyear").unwrap()));
    }
    scan.close().unwrap();
    tx.commit().unwrap();

    assert_eq!(rows, vec![("hogetaro".to_string(), 2000)]);
}

#[test]
fn views_are_expanded_transparently_at_query_time() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    let tx = db.new_tx().unwrap();
    db.execute_update("create table student (sname varchar(32), gradyear int)", &tx)
        .unwrap();
    db.execute_update("insert into student (sname, gradyear) values ('hogetaro', 1993)", &tx)
        .unwrap();
    db.execute_update("create view seniors as select sname, gradyear from student", &tx)
        .unwrap();
    tx.commit().unwrap();

    let tx = db.new_tx().unwrap();
    let plan = db.create_query_plan("select sname from seniors", &tx).unwrap();
    let mut scan = plan.open().unwrap();
    assert!(scan.next().unwrap());
    assert_eq!(scan.get_string("sname").unwrap(), "hogetaro");
    assert!(!scan.next().unwrap());
    scan.close().unwrap();
    tx.commit().unwrap();
}
