//! Runtime tunables for a `Database`.
//!
//! Loading one of these from a TOML file on disk is a front-end concern
//! (`coredb-cli` does it with `confy`); the core just consumes the struct.

use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_WAL_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_WAL_MAX_TOTAL_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_HNSW_M: usize = 16;
pub const DEFAULT_HNSW_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbConfig {
    pub wal_dir: String,
    pub wal_max_file_size: u64,
    pub wal_max_total_size: u64,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub page_size: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            wal_dir: "wal".to_string(),
            wal_max_file_size: DEFAULT_WAL_MAX_FILE_SIZE,
            wal_max_total_size: DEFAULT_WAL_MAX_TOTAL_SIZE,
            hnsw_m: DEFAULT_HNSW_M,
            hnsw_ef_construction: DEFAULT_HNSW_EF_CONSTRUCTION,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DbConfig::default();
        assert_eq!(config.wal_max_file_size, 16 * 1024 * 1024);
        assert_eq!(config.wal_max_total_size, 1024 * 1024 * 1024);
        assert_eq!(config.hnsw_m, 16);
        assert_eq!(config.hnsw_ef_construction, 200);
        assert_eq!(config.page_size, 4096);
    }
}
