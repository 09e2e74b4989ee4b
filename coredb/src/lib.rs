//! An embedded, single-process database unifying a row-oriented relational
//! store with snapshot-isolated MVCC, a B+ tree secondary-index layer, and
//! an HNSW approximate-nearest-neighbor vector index, all behind one WAL
//! for crash recovery.
//!
//! ## Getting started
//!
//! ```rust
//! use coredb::command::{Command, QueryResult};
//! use coredb::config::DbConfig;
//! use coredb::db::Database;
//! use coredb::row::Row;
//! use coredb::schema::{ColumnDef, ColumnType};
//! use coredb::value::Value;
//!
//! fn run() -> coredb::error::CResult<()> {
//!     let dir = tempfile::tempdir().unwrap();
//!     let db = Database::open(dir.path(), DbConfig::default())?;
//!
//!     db.execute(Command::CreateTable {
//!         name: "widgets".to_string(),
//!         columns: vec![ColumnDef::new("name", ColumnType::Text)],
//!     })?;
//!
//!     let mut values = Row::new();
//!     values.set("name", Value::Text("gizmo".to_string()));
//!     db.execute(Command::Insert { table: "widgets".to_string(), values })?;
//!
//!     if let QueryResult::Rows(rows) = db.execute(Command::Select {
//!         table: "widgets".to_string(),
//!         predicate: None,
//!         order_by: None,
//!         limit: None,
//!     })? {
//!         assert_eq!(rows.len(), 1);
//!     }
//!     Ok(())
//! }
//! ```

pub mod btree;
pub mod clog;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod hnsw;
pub mod index_manager;
pub mod mvcc;
pub mod persistence;
pub mod row;
pub mod schema;
pub mod table;
pub mod value;
pub mod wal;
