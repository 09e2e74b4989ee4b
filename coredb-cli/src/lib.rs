//! Command-line front end for `coredb`.
//!
//! This crate owns everything the core database stays deliberately silent
//! about: a small command-language parser, a readline-based REPL, settings
//! loading, and logging. None of it participates in MVCC, the WAL, or the
//! index layers directly — it only ever talks to `coredb` through
//! `coredb::command::Command` and `coredb::db::Database`.
//!
//! ## Getting started
//!
//! ```text
//! $ coredb-cli --db-path ./mydb
//! Welcome to coredb.
//!
//! coredb > CREATE TABLE widgets (name TEXT)
//! OK
//! coredb > INSERT INTO widgets (name) VALUES ("gizmo")
//! OK (row id 1)
//! coredb > SELECT * FROM widgets
//! 1: {"name": "gizmo"}
//! (1 row(s))
//! ```

pub mod config;
pub mod parser;
pub mod rusty;
pub mod session;
pub mod trace;
