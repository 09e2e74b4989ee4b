//! Write-ahead log: records, path hardening, writer, reader, and recovery
//! planning.

mod path_guard;
mod reader;
mod record;
mod recovery;
mod writer;

pub use path_guard::validate_wal_path;
pub use reader::{list_wal_files, WalFileReader};
pub use record::{Record, RecordType};
pub use recovery::{plan_recovery, RecoveryPlan};
pub use writer::{WalWriter, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_WAL_SIZE};
