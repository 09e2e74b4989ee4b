use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};

use coredb::command::QueryResult;
use coredb::db::Database;

use crate::config::CliConfig;
use crate::parser::{self, KEYWORDS};
use crate::rusty::CliHelper;

pub struct Session {
    db: Database,
    settings: CliConfig,
}

impl Session {
    pub fn new(db: Database, settings: CliConfig) -> Self {
        println!("Welcome to coredb.");
        println!();
        Session { db, settings }
    }

    fn prompt(&self) -> String {
        match &self.settings.prompt {
            Some(prompt) => format!("{} > ", prompt.trim_end()),
            None => "coredb > ".to_string(),
        }
    }

    pub fn handle_repl(&mut self) {
        let config = Builder::new().completion_prompt_limit(5).completion_type(CompletionType::Circular).build();
        let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config).expect("failed to build line editor");
        let keywords: Vec<String> = KEYWORDS.iter().map(|s| s.to_string()).collect();
        rl.set_helper(Some(CliHelper::with_keywords(Arc::new(keywords))));
        rl.load_history(&history_path()).ok();

        loop {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line);
                    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                        break;
                    }
                    match self.handle_statement(line) {
                        Ok(message) => println!("{message}"),
                        Err(err) => eprintln!("error: {err}"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("readline error: {err}");
                    break;
                }
            }
        }

        println!("Bye~");
        let _ = rl.save_history(&history_path());
    }

    /// Runs every non-blank line of `text` as one statement (used for
    /// `--query` and piped stdin).
    pub fn handle_script(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message = self.handle_statement(line)?;
            println!("{message}");
        }
        Ok(())
    }

    fn handle_statement(&mut self, line: &str) -> Result<String> {
        info!("executing: {line}");
        let command = parser::parse(line).map_err(|e| anyhow!("parse error: {e}"))?;
        let result = self.db.execute(command).map_err(|e| anyhow!("{e}"))?;
        Ok(format_result(&result))
    }
}

fn format_result(result: &QueryResult) -> String {
    match result {
        QueryResult::Unit => "OK".to_string(),
        QueryResult::TxId(txid) => format!("OK (txid {txid})"),
        QueryResult::RowId(row_id) => format!("OK (row id {row_id})"),
        QueryResult::Count(count) => format!("OK ({count} row(s))"),
        QueryResult::Rows(rows) => {
            if rows.is_empty() {
                return "(0 rows)".to_string();
            }
            let mut out = String::new();
            for (row_id, row) in rows {
                out.push_str(&format!("{row_id}: {row:?}\n"));
            }
            out.push_str(&format!("({} row(s))", rows.len()));
            out
        }
    }
}

fn history_path() -> String {
    format!("{}/.coredb_history", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}
