//! Commit log: durable txid → status map.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CResult, Error};

const MAGIC: &[u8; 4] = b"CLOG";
const VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    InProgress,
    Committed,
    Aborted,
}

impl TxStatus {
    fn to_byte(self) -> u8 {
        match self {
            TxStatus::InProgress => 0,
            TxStatus::Committed => 1,
            TxStatus::Aborted => 2,
        }
    }

    fn from_byte(b: u8) -> CResult<Self> {
        match b {
            0 => Ok(TxStatus::InProgress),
            1 => Ok(TxStatus::Committed),
            2 => Ok(TxStatus::Aborted),
            other => Err(Error::Internal(format!("invalid clog status byte: {other}"))),
        }
    }
}

/// Durable txid → status map. The bootstrap txid 0 is virtual: it is always
/// committed and never stored explicitly.
pub struct Clog {
    entries: Mutex<HashMap<u64, TxStatus>>,
}

impl Default for Clog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clog {
    pub fn new() -> Self {
        Clog { entries: Mutex::new(HashMap::new()) }
    }

    pub fn set(&self, txid: u64, status: TxStatus) {
        if txid == 0 {
            return;
        }
        self.entries.lock().expect("clog mutex poisoned").insert(txid, status);
    }

    pub fn status(&self, txid: u64) -> TxStatus {
        if txid == 0 {
            return TxStatus::Committed;
        }
        self.entries
            .lock()
            .expect("clog mutex poisoned")
            .get(&txid)
            .copied()
            .unwrap_or(TxStatus::InProgress)
    }

    pub fn is_committed(&self, txid: u64) -> bool {
        self.status(txid) == TxStatus::Committed
    }

    pub fn remove(&self, txid: u64) {
        self.entries.lock().expect("clog mutex poisoned").remove(&txid);
    }

    /// Highest txid this CLOG has ever recorded a status for, 0 if none.
    /// Used on recovery to seed the transaction manager's next txid past
    /// every txid already accounted for.
    pub fn max_txid(&self) -> u64 {
        self.entries.lock().expect("clog mutex poisoned").keys().copied().max().unwrap_or(0)
    }

    /// Merges a WAL-derived status into this CLOG. WAL-derived status wins
    /// on conflict.
    pub fn merge_from_wal(&self, txid: u64, status: TxStatus) {
        self.set(txid, status);
    }

    pub fn save(&self, path: &Path) -> CResult<()> {
        let entries = self.entries.lock().expect("clog mutex poisoned");
        let mut buf = Vec::with_capacity(16 + entries.len() * 9);
        buf.extend_from_slice(MAGIC);
        buf.write_u32::<LittleEndian>(VERSION)?;
        buf.write_u64::<LittleEndian>(entries.len() as u64)?;
        for (txid, status) in entries.iter() {
            buf.write_u64::<LittleEndian>(*txid)?;
            buf.write_u8(status.to_byte())?;
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> CResult<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }

    fn from_bytes(buf: &[u8]) -> CResult<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Internal("invalid clog magic".to_string()));
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::Internal(format!("unsupported clog version: {version}")));
        }
        let entry_count = cursor.read_u64::<LittleEndian>()?;
        let mut entries = HashMap::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let txid = cursor.read_u64::<LittleEndian>()?;
            let status = TxStatus::from_byte(cursor.read_u8()?)?;
            entries.insert(txid, status);
        }
        Ok(Clog { entries: Mutex::new(entries) })
    }
}

#[cfg(test)]
mod clog_test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_txid_is_always_committed() {
        let clog = Clog::new();
        assert!(clog.is_committed(0));
        clog.set(0, TxStatus::Aborted);
        assert!(clog.is_committed(0));
    }

    #[test]
    fn unknown_txid_is_in_progress() {
        let clog = Clog::new();
        assert_eq!(clog.status(42), TxStatus::InProgress);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clog");
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        clog.set(2, TxStatus::Aborted);
        clog.set(3, TxStatus::InProgress);
        clog.save(&path).unwrap();

        let loaded = Clog::load(&path).unwrap();
        assert_eq!(loaded.status(1), TxStatus::Committed);
        assert_eq!(loaded.status(2), TxStatus::Aborted);
        assert_eq!(loaded.status(3), TxStatus::InProgress);
    }

    #[test]
    fn wal_derived_status_wins_on_merge() {
        let clog = Clog::new();
        clog.set(5, TxStatus::InProgress);
        clog.merge_from_wal(5, TxStatus::Committed);
        assert_eq!(clog.status(5), TxStatus::Committed);
    }
}
