use coredb::command::{Command, Predicate, QueryResult};
use coredb::config::DbConfig;
use coredb::db::Database;
use coredb::error::Error;
use coredb::row::Row;
use coredb::schema::{ColumnDef, ColumnType};
use coredb::value::Value;

fn main() {
    println!("Hello, coredb!");

    run().unwrap();

    println!("Bye~");
}

fn run() -> Result<(), Error> {
    let dir = tempdir::TempDir::new("coredb-demo")?;
    let db = Database::open(dir.path(), DbConfig::default())?;

    db.execute(Command::CreateTable {
        name: "widgets".to_string(),
        columns: vec![ColumnDef::new("name", ColumnType::Text), ColumnDef::new("weight", ColumnType::Int)],
    })?;

    let mut a = Row::new();
    a.set("name", Value::Text("gizmo".to_string()));
    a.set("weight", Value::Int(3));
    db.execute(Command::Insert { table: "widgets".to_string(), values: a })?;

    let mut b = Row::new();
    b.set("name", Value::Text("widget".to_string()));
    b.set("weight", Value::Int(7));
    db.execute(Command::Insert { table: "widgets".to_string(), values: b })?;

    db.execute(Command::Delete {
        table: "widgets".to_string(),
        predicate: Some(Predicate::equals("name", Value::Text("gizmo".to_string()))),
    })?;

    let result = db.execute(Command::Select {
        table: "widgets".to_string(),
        predicate: None,
        order_by: None,
        limit: None,
    })?;

    // Make sure the scan yields the expected results: only "widget" should
    // survive the delete above.
    match result {
        QueryResult::Rows(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].1.get("name"), Some(&Value::Text("widget".to_string())));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}
