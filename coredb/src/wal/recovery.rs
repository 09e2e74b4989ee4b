//! Deterministic, idempotent WAL replay.
//!
//! `plan_recovery` does not touch table state itself — it has no table to
//! touch — it only decides which mutation records actually happened. The
//! caller (`Database::recover`) replays the returned records against its
//! tables in order.

use std::collections::HashMap;
use std::path::Path;

use crate::clog::TxStatus;
use crate::error::CResult;
use crate::wal::reader::{list_wal_files, WalFileReader};
use crate::wal::record::{Record, RecordType};

pub struct RecoveryPlan {
    /// Mutating records (insert/update/delete) belonging to committed
    /// transactions, in the order they were originally written.
    pub records: Vec<Record>,
    /// Final status observed for every transaction mentioned in the WAL.
    pub tx_outcome: HashMap<u64, TxStatus>,
    /// Highest LSN seen, so the caller can resume LSN allocation.
    pub max_lsn: u64,
}

pub fn plan_recovery(wal_dir: &Path) -> CResult<RecoveryPlan> {
    let files = list_wal_files(wal_dir)?;

    let mut all_records = Vec::new();
    for path in &files {
        let records = WalFileReader::open(path)?.into_records();
        all_records.extend(records);
    }

    let mut tx_outcome = HashMap::new();
    let mut max_lsn = 0u64;
    for record in &all_records {
        max_lsn = max_lsn.max(record.lsn);
        match record.record_type {
            RecordType::Commit => {
                tx_outcome.insert(record.tx_id, TxStatus::Committed);
            }
            RecordType::Rollback => {
                tx_outcome.insert(record.tx_id, TxStatus::Aborted);
            }
            _ => {}
        }
    }

    let records = all_records
        .into_iter()
        .filter(|r| {
            matches!(r.record_type, RecordType::Insert | RecordType::Update | RecordType::Delete)
                && tx_outcome.get(&r.tx_id) == Some(&TxStatus::Committed)
        })
        .collect();

    Ok(RecoveryPlan { records, tx_outcome, max_lsn })
}

#[cfg(test)]
mod recovery_test {
    use super::*;
    use crate::wal::writer::{WalWriter, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE};
    use tempfile::tempdir;

    #[test]
    fn s5_only_committed_transactions_replay() {
        let dir = tempdir().unwrap();
        {
            let mut writer =
                WalWriter::open(dir.path(), DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE)
                    .unwrap();
            writer.append(RecordType::Begin, 1, 0, "", vec![]).unwrap();
            for i in 0..900u64 {
                writer.append(RecordType::Insert, 1, i, "widgets", vec![]).unwrap();
            }
            writer.append(RecordType::Commit, 1, 0, "", vec![]).unwrap();

            writer.append(RecordType::Begin, 2, 0, "", vec![]).unwrap();
            for i in 900..1000u64 {
                writer.append(RecordType::Insert, 2, i, "widgets", vec![]).unwrap();
            }
            // no commit record for tx 2: simulates a crash before commit
        }

        let plan = plan_recovery(dir.path()).unwrap();
        assert_eq!(plan.records.len(), 900);
        assert_eq!(plan.tx_outcome.get(&1), Some(&TxStatus::Committed));
        assert_eq!(plan.tx_outcome.get(&2), None);
    }

    #[test]
    fn recovery_is_idempotent() {
        let dir = tempdir().unwrap();
        {
            let mut writer =
                WalWriter::open(dir.path(), DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE)
                    .unwrap();
            writer.append(RecordType::Begin, 1, 0, "", vec![]).unwrap();
            writer.append(RecordType::Insert, 1, 1, "widgets", vec![]).unwrap();
            writer.append(RecordType::Commit, 1, 0, "", vec![]).unwrap();
        }
        let first = plan_recovery(dir.path()).unwrap();
        let second = plan_recovery(dir.path()).unwrap();
        assert_eq!(first.records.len(), second.records.len());
    }
}
