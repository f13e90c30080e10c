//! Interactive SQL shell: opens (or creates) a database directory and runs
//! one statement per line through the planner, printing results to stdout.

use std::io::{self, BufRead, Write};

use simpledb_rs::{DatabaseConfig, Result, SimpleDb};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let data_dir = args.next().unwrap_or_else(|| "./data".to_string());

    let config = DatabaseConfig {
        data_dir,
        ..DatabaseConfig::default()
    };

    let db = SimpleDb::new(&config)?;
    println!("simpledb ready at {} (type 'exit' to quit)", config.data_dir);

    let stdin = io::stdin();
    let tx = db.new_tx()?;
    loop {
        print!("sql> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        if cmd.eq_ignore_ascii_case("exit") || cmd.eq_ignore_ascii_case("quit") {
            break;
        }

        if cmd.to_lowercase().starts_with("select") {
            match run_query(&db, cmd, &tx) {
                Ok(()) => {}
                Err(e) => println!("error: {e}"),
            }
            continue;
        }

        match db.execute_update(cmd, &tx) {
            Ok(n) => println!("{n} row(s) affected"),
            Err(e) => println!("error: {e}"),
        }
    }

    tx.commit()?;
    Ok(())
}

fn run_query(db: &SimpleDb, sql: &str, tx: &std::sync::Arc<simpledb_rs::transaction::Transaction>) -> Result<()> {
    let plan = db.create_query_plan(sql, tx)?;
    let schema = plan.schema().fields().to_vec();
    let mut scan = plan.open()?;

    for fld in &schema {
        print!("{fld:<16}");
    }
    println!();

    use simpledb_rs::record::Types;
    let mut count = 0;
    while scan.next()? {
        for fld in &schema {
            let ty = plan.schema().field_type(fld);
            match ty {
                Types::Integer => print!("{:<16}", scan.get_int(fld)?),
                Types::Varchar => print!("{:<16}", scan.get_string(fld)?),
            }
        }
        println!();
        count += 1;
    }
    scan.close()?;
    println!("{count} row(s) selected");
    Ok(())
}
