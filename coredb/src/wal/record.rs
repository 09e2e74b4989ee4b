//! On-disk WAL record layout.
//!
//! `u8 type, u64 tx_id, u64 lsn, u64 row_id, u16 table_name_len, table_name,
//! u32 data_len, data, u32 crc32` — little-endian, CRC32 (IEEE) over every
//! preceding byte of the record.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CResult, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Begin,
    Commit,
    Rollback,
    Insert,
    Delete,
    Update,
    Checkpoint,
}

impl RecordType {
    fn to_byte(self) -> u8 {
        match self {
            RecordType::Begin => 0,
            RecordType::Commit => 1,
            RecordType::Rollback => 2,
            RecordType::Insert => 3,
            RecordType::Delete => 4,
            RecordType::Update => 5,
            RecordType::Checkpoint => 6,
        }
    }

    fn from_byte(b: u8) -> CResult<Self> {
        match b {
            0 => Ok(RecordType::Begin),
            1 => Ok(RecordType::Commit),
            2 => Ok(RecordType::Rollback),
            3 => Ok(RecordType::Insert),
            4 => Ok(RecordType::Delete),
            5 => Ok(RecordType::Update),
            6 => Ok(RecordType::Checkpoint),
            other => Err(Error::InvalidRecordType(other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Record {
    pub record_type: RecordType,
    pub tx_id: u64,
    pub lsn: u64,
    pub row_id: u64,
    pub table_name: String,
    pub data: Vec<u8>,
}

impl Record {
    pub fn encode(&self) -> CResult<Vec<u8>> {
        let table_bytes = self.table_name.as_bytes();
        if table_bytes.len() > u16::MAX as usize {
            return Err(Error::Internal("table name too long for wal record".to_string()));
        }
        let mut buf = Vec::with_capacity(8 + 8 + 8 + 2 + table_bytes.len() + 4 + self.data.len() + 4);
        buf.write_u8(self.record_type.to_byte())?;
        buf.write_u64::<LittleEndian>(self.tx_id)?;
        buf.write_u64::<LittleEndian>(self.lsn)?;
        buf.write_u64::<LittleEndian>(self.row_id)?;
        buf.write_u16::<LittleEndian>(table_bytes.len() as u16)?;
        buf.extend_from_slice(table_bytes);
        buf.write_u32::<LittleEndian>(self.data.len() as u32)?;
        buf.extend_from_slice(&self.data);

        let crc = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(crc)?;
        Ok(buf)
    }

    /// Decodes a single record from the front of `buf`, returning the record
    /// and the number of bytes consumed. Returns `Err(ChecksumMismatch)` if
    /// the trailing CRC32 does not match; stopping at the first bad record in
    /// a file is the caller's responsibility, not this function's.
    pub fn decode(buf: &[u8]) -> CResult<(Record, usize)> {
        let mut cursor = std::io::Cursor::new(buf);
        let record_type = RecordType::from_byte(cursor.read_u8()?)?;
        let tx_id = cursor.read_u64::<LittleEndian>()?;
        let lsn = cursor.read_u64::<LittleEndian>()?;
        let row_id = cursor.read_u64::<LittleEndian>()?;
        let table_name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let mut table_name_bytes = vec![0u8; table_name_len];
        std::io::Read::read_exact(&mut cursor, &mut table_name_bytes)?;
        let data_len = cursor.read_u32::<LittleEndian>()? as usize;
        let mut data = vec![0u8; data_len];
        std::io::Read::read_exact(&mut cursor, &mut data)?;

        let body_len = cursor.position() as usize;
        let stored_crc = cursor.read_u32::<LittleEndian>()?;
        let computed_crc = crc32fast::hash(&buf[..body_len]);
        if stored_crc != computed_crc {
            return Err(Error::ChecksumMismatch);
        }

        let table_name = String::from_utf8(table_name_bytes)?;
        let record = Record { record_type, tx_id, lsn, row_id, table_name, data };
        Ok((record, body_len + 4))
    }
}

#[cfg(test)]
mod record_test {
    use super::*;

    fn sample() -> Record {
        Record {
            record_type: RecordType::Insert,
            tx_id: 7,
            lsn: 42,
            row_id: 99,
            table_name: "widgets".to_string(),
            data: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn round_trips() {
        let record = sample();
        let encoded = record.encode().unwrap();
        let (decoded, consumed) = Record::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.tx_id, 7);
        assert_eq!(decoded.lsn, 42);
        assert_eq!(decoded.row_id, 99);
        assert_eq!(decoded.table_name, "widgets");
        assert_eq!(decoded.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn single_byte_mutation_triggers_checksum_mismatch() {
        let record = sample();
        let mut encoded = record.encode().unwrap();
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0xFF;
        let err = Record::decode(&encoded).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch));
    }
}
