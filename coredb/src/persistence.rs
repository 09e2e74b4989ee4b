//! Table snapshot persistence and the on-disk directory layout tying WAL,
//! CLOG, table snapshots and HNSW indexes together.
//!
//! Table snapshots are a self-describing JSON body behind a small binary
//! header (magic + version), the same shape as `clog.rs`'s own framing but
//! using `serde_json` for the body since a table's shape (schema plus an
//! arbitrary number of typed rows) is far less regular than the CLOG's flat
//! tuple list.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde_derive::{Deserialize, Serialize};

use crate::clog::Clog;
use crate::error::{CResult, Error};
use crate::mvcc::Snapshot;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::Table;

const TABLE_MAGIC: &[u8; 4] = b"TABL";
const TABLE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct TableSnapshotBody {
    schema: Schema,
    next_row_id: u64,
    rows: Vec<(u64, Row)>,
}

/// Writes every row visible under `snapshot` plus schema/next-row-id
/// bookkeeping, sufficient to reconstruct the table with row ids preserved.
pub fn save_table(table: &Table, snapshot: &Snapshot, clog: &Clog, path: &Path) -> CResult<()> {
    let body = TableSnapshotBody {
        schema: table.schema.clone(),
        next_row_id: table.next_row_id_hint(),
        rows: table.scan(snapshot, clog),
    };
    let json = serde_json::to_vec(&body).map_err(|e| Error::Internal(e.to_string()))?;

    let mut buf = Vec::with_capacity(8 + json.len());
    buf.extend_from_slice(TABLE_MAGIC);
    buf.write_u32::<LittleEndian>(TABLE_VERSION)?;
    buf.extend_from_slice(&json);

    let mut file = fs::File::create(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

/// Loads a table snapshot written by `save_table`. Rows are inserted under
/// the bootstrap txid (always committed), since a loaded
/// snapshot has no live transaction that created its rows.
pub fn load_table(name: &str, path: &Path) -> CResult<Table> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < 8 || &bytes[0..4] != TABLE_MAGIC {
        return Err(Error::Internal("invalid table snapshot magic".to_string()));
    }
    let version = (&bytes[4..8]).read_u32::<LittleEndian>()?;
    if version != TABLE_VERSION {
        return Err(Error::Internal(format!("unsupported table snapshot version: {version}")));
    }
    let body: TableSnapshotBody =
        serde_json::from_slice(&bytes[8..]).map_err(|e| Error::Internal(e.to_string()))?;

    let table = Table::with_next_row_id(name, body.schema, body.next_row_id);
    for (row_id, values) in body.rows {
        table.insert_with_row_id(row_id, values, 0);
    }
    Ok(table)
}

/// Directory layout: `wal/`, `clog`, `tables/<name>`, `hnsw/<dim>`, each
/// loadable independently.
pub struct DbPaths {
    root: PathBuf,
}

impl DbPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DbPaths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.root.join("wal")
    }

    pub fn clog_path(&self) -> PathBuf {
        self.root.join("clog")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.root.join("tables")
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.tables_dir().join(name)
    }

    pub fn hnsw_dir(&self) -> PathBuf {
        self.root.join("hnsw")
    }

    pub fn hnsw_path(&self, dim: usize) -> PathBuf {
        self.hnsw_dir().join(dim.to_string())
    }

    pub fn ensure_dirs(&self) -> CResult<()> {
        fs::create_dir_all(self.wal_dir())?;
        fs::create_dir_all(self.tables_dir())?;
        fs::create_dir_all(self.hnsw_dir())?;
        Ok(())
    }
}

/// Point-in-time engine status: row counts per table, active transaction
/// count, WAL bytes written so far, and HNSW node counts per embedding
/// dimension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbStatus {
    pub table_row_counts: BTreeMap<String, usize>,
    pub active_transactions: usize,
    pub wal_bytes_written: u64,
    pub hnsw_node_counts: BTreeMap<usize, usize>,
}

#[cfg(test)]
mod persistence_test {
    use super::*;
    use crate::clog::TxStatus;
    use crate::schema::{ColumnDef, ColumnType};
    use crate::value::Value;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn table_snapshot_round_trips_rows_and_row_ids() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        let schema = Schema::new(vec![ColumnDef::new("name", ColumnType::Text)]).unwrap();
        let table = Table::new("widgets", schema);
        let mut row_a = Row::new();
        row_a.set("name", Value::Text("a".to_string()));
        let row_id = table.insert(row_a, 1);

        let snapshot = Snapshot::new(2, HashSet::new(), 0);
        let dir = tempdir().unwrap();
        let path = dir.path().join("widgets");
        save_table(&table, &snapshot, &clog, &path).unwrap();

        let loaded = load_table("widgets", &path).unwrap();
        let loaded_snapshot = Snapshot::new(0, HashSet::new(), 0);
        let loaded_clog = Clog::new();
        let got = loaded.get(row_id, &loaded_snapshot, &loaded_clog).unwrap();
        assert_eq!(got.get("name"), Some(&Value::Text("a".to_string())));
        assert_eq!(loaded.next_row_id_hint(), table.next_row_id_hint());
    }

    #[test]
    fn paths_follow_recommended_layout() {
        let paths = DbPaths::new("/tmp/coredb-example");
        assert_eq!(paths.wal_dir(), Path::new("/tmp/coredb-example/wal"));
        assert_eq!(paths.clog_path(), Path::new("/tmp/coredb-example/clog"));
        assert_eq!(paths.table_path("widgets"), Path::new("/tmp/coredb-example/tables/widgets"));
        assert_eq!(paths.hnsw_path(128), Path::new("/tmp/coredb-example/hnsw/128"));
    }
}
