//! WAL file iteration and crash-tolerant reading.

use std::io::Read;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{CResult, Error};
use crate::wal::record::Record;
use crate::wal::writer::{HEADER_LEN, HEADER_VERSION, MAGIC};

pub struct WalFileReader {
    records: Vec<Record>,
}

impl WalFileReader {
    /// Opens and parses a single WAL file. Stops at the first corrupt or
    /// truncated record rather than propagating a hard error — a partial
    /// tail is the normal result of a crash mid-write.
    pub fn open(path: &Path) -> CResult<Self> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)?.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_LEN {
            return Err(Error::InvalidWalMagic);
        }
        let mut header = std::io::Cursor::new(&bytes[..HEADER_LEN]);
        let magic = header.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(Error::InvalidWalMagic);
        }
        let version = header.read_u32::<LittleEndian>()?;
        if version != HEADER_VERSION {
            return Err(Error::UnsupportedWalVersion(version));
        }

        let mut records = Vec::new();
        let mut offset = HEADER_LEN;
        while offset < bytes.len() {
            match Record::decode(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    offset += consumed;
                    records.push(record);
                }
                Err(_) => break,
            }
        }
        Ok(WalFileReader { records })
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Lists WAL files under `dir` in ascending sequence order.
pub fn list_wal_files(dir: &Path) -> CResult<Vec<std::path::PathBuf>> {
    let mut entries: Vec<(u64, std::path::PathBuf)> = Vec::new();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(seq) = name.strip_prefix("wal.").and_then(|s| s.parse::<u64>().ok()) {
            entries.push((seq, entry.path()));
        }
    }
    entries.sort_by_key(|(seq, _)| *seq);
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod reader_test {
    use super::*;
    use crate::wal::record::RecordType;
    use crate::wal::writer::{WalWriter, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE};
    use tempfile::tempdir;

    #[test]
    fn reads_back_appended_records_in_order() {
        let dir = tempdir().unwrap();
        let mut writer =
            WalWriter::open(dir.path(), DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE).unwrap();
        writer.append(RecordType::Begin, 1, 0, "", vec![]).unwrap();
        writer.append(RecordType::Insert, 1, 5, "widgets", vec![9, 9]).unwrap();
        writer.append(RecordType::Commit, 1, 0, "", vec![]).unwrap();

        let files = list_wal_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        let records = WalFileReader::open(&files[0]).unwrap().into_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].row_id, 5);
    }

    #[test]
    fn stops_at_corrupted_tail_without_erroring() {
        let dir = tempdir().unwrap();
        let mut writer =
            WalWriter::open(dir.path(), DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE).unwrap();
        writer.append(RecordType::Insert, 1, 1, "widgets", vec![1]).unwrap();
        writer.append(RecordType::Insert, 1, 2, "widgets", vec![2]).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let files = list_wal_files(dir.path()).unwrap();
        let mut bytes = std::fs::read(&files[0]).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&files[0], &bytes).unwrap();

        let records = WalFileReader::open(&files[0]).unwrap().into_records();
        assert_eq!(records.len(), 1);
    }
}
