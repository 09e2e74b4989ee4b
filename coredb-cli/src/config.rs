//! CLI-level settings, loaded from a TOML file with `confy` (the core
//! crate itself takes no environment variables or config files, per
//! `coredb::config::DbConfig`'s doc comment).

use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Directory the database lives in (wal/, clog, tables/, hnsw/).
    pub db_path: String,
    pub prompt: Option<String>,
    pub log_level: String,
    pub multi_line: Option<bool>,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            db_path: "coredb-data".to_string(),
            prompt: Some("coredb".to_string()),
            log_level: "info".to_string(),
            multi_line: Some(true),
        }
    }
}

impl CliConfig {
    pub fn load(path: &str) -> Self {
        confy::load_path(path).unwrap_or_default()
    }
}
