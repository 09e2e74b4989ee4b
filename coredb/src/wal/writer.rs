//! Append-only WAL writer: buffering, rotation, disk quota, group commit.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use fs4::FileExt;

use crate::error::{CResult, Error};
use crate::wal::path_guard;
use crate::wal::record::{Record, RecordType};

pub const MAGIC: u32 = 0x5741_4C00;
pub const HEADER_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 36;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_TOTAL_WAL_SIZE: u64 = 1024 * 1024 * 1024;

fn file_name_for_sequence(sequence: u64) -> String {
    format!("wal.{sequence:06}")
}

fn write_header(file: &mut File, sequence: u64, created_at: i64) -> CResult<()> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.write_u32::<LittleEndian>(MAGIC)?;
    buf.write_u32::<LittleEndian>(HEADER_VERSION)?;
    buf.write_u32::<LittleEndian>(4096)?; // page size
    buf.write_u64::<LittleEndian>(sequence)?;
    buf.write_i64::<LittleEndian>(created_at)?;
    buf.extend_from_slice(&[0u8; 8]); // reserved
    debug_assert_eq!(buf.len(), HEADER_LEN);
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

pub struct WalWriter {
    dir: PathBuf,
    max_file_size: u64,
    max_total_wal_size: u64,
    sequence: u64,
    file: BufWriter<File>,
    current_size: u64,
    total_size: u64,
    next_lsn: u64,
}

impl WalWriter {
    pub fn open(dir: impl AsRef<Path>, max_file_size: u64, max_total_wal_size: u64) -> CResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let total_size = existing_total_size(&dir)?;
        let (sequence, file, current_size) = match latest_sequence(&dir)? {
            None => (0, Self::create_file(&dir, 0)?, HEADER_LEN as u64),
            Some(seq) => {
                let path = dir.join(file_name_for_sequence(seq));
                let size = std::fs::metadata(&path)?.len();
                let file = OpenOptions::new().append(true).open(&path)?;
                file.try_lock_exclusive()?;
                (seq, file, size)
            }
        };

        Ok(WalWriter {
            dir,
            max_file_size,
            max_total_wal_size,
            sequence,
            file: BufWriter::new(file),
            current_size,
            total_size: total_size.max(current_size),
            next_lsn: 1,
        })
    }

    fn create_file(dir: &Path, sequence: u64) -> CResult<File> {
        let name = file_name_for_sequence(sequence);
        path_guard::validate_wal_path(&name)?;
        let path = dir.join(&name);
        path_guard::reject_symlink(&path)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.try_lock_exclusive()?;
        write_header(&mut file, sequence, current_unix_time())?;
        Ok(file)
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_size
    }

    fn next_lsn(&mut self) -> u64 {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        lsn
    }

    /// Appends a record. Commit/rollback records flush and fsync
    /// immediately (the group-commit boundary); other record types are
    /// buffered until the next flush-triggering record or an explicit flush.
    pub fn append(
        &mut self,
        record_type: RecordType,
        tx_id: u64,
        row_id: u64,
        table_name: &str,
        data: Vec<u8>,
    ) -> CResult<u64> {
        let lsn = self.next_lsn();
        let record = Record { record_type, tx_id, lsn, row_id, table_name: table_name.to_string(), data };
        let encoded = record.encode()?;

        let projected_total = self.total_size + encoded.len() as u64;
        if projected_total > self.max_total_wal_size {
            return Err(Error::WalDiskQuotaExceeded {
                requested: encoded.len() as u64,
                quota: self.max_total_wal_size,
            });
        }

        if self.current_size + encoded.len() as u64 > self.max_file_size {
            self.rotate()?;
        }

        self.file.write_all(&encoded)?;
        self.current_size += encoded.len() as u64;
        self.total_size += encoded.len() as u64;

        if matches!(record_type, RecordType::Commit | RecordType::Rollback) {
            self.flush()?;
        }
        Ok(lsn)
    }

    pub fn flush(&mut self) -> CResult<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    fn rotate(&mut self) -> CResult<()> {
        self.flush()?;
        let new_sequence = self.sequence + 1;
        let new_file = Self::create_file(&self.dir, new_sequence)?;
        self.file = BufWriter::new(new_file);
        self.sequence = new_sequence;
        self.current_size = HEADER_LEN as u64;
        self.total_size += HEADER_LEN as u64;
        Ok(())
    }

    /// Deletes WAL files whose sequence is strictly below `checkpoint_sequence`.
    /// The current file is never deleted.
    pub fn truncate_before(&mut self, checkpoint_sequence: u64) -> CResult<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(seq) = parse_sequence(&name) {
                if seq < checkpoint_sequence && seq != self.sequence {
                    std::fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }
}

fn parse_sequence(file_name: &str) -> Option<u64> {
    file_name.strip_prefix("wal.")?.parse::<u64>().ok()
}

fn latest_sequence(dir: &Path) -> CResult<Option<u64>> {
    let mut max = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(seq) = parse_sequence(&name.to_string_lossy()) {
            max = Some(max.map_or(seq, |m: u64| m.max(seq)));
        }
    }
    Ok(max)
}

fn existing_total_size(dir: &Path) -> CResult<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if parse_sequence(&entry.file_name().to_string_lossy()).is_some() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
