use std::io::{stdin, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;
use log::info;

use coredb::config::DbConfig;
use coredb::db::Database;

use coredb_cli::config::CliConfig;
use coredb_cli::session::Session;
use coredb_cli::trace;

#[derive(Debug, Parser)]
#[command(author, version, about = "coredb command-line front end")]
struct Args {
    /// Directory the database lives in (created if it doesn't exist yet).
    #[clap(short = 'd', long = "db-path")]
    db_path: Option<String>,

    /// CLI settings file path.
    #[clap(short = 'c', long = "config", default_value = "config/coredb-cli.toml")]
    config: String,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Run a single statement non-interactively instead of starting a REPL.
    #[clap(long, require_equals = true)]
    query: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = format!("{}/.coredb-cli", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    let _guards = trace::init_logging(&log_dir, &args.log_level)?;
    info!("coredb-cli starting with args: {args:?}");

    let mut settings = CliConfig::load(&args.config);
    if let Some(db_path) = &args.db_path {
        settings.db_path = db_path.clone();
    }
    info!("coredb-cli config: {settings:?}");

    let db = Database::open(&settings.db_path, DbConfig::default())?;
    let mut session = Session::new(db, settings);

    let is_repl = stdin().is_terminal() && args.query.is_none();
    if is_repl {
        session.handle_repl();
        return Ok(());
    }

    let text = match args.query {
        Some(query) => query,
        None => {
            let mut buf = String::new();
            stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    session.handle_script(&text)
}
