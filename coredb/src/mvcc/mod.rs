//! MVCC core: snapshots, transactions, and the transaction manager.

mod snapshot;
mod transaction;
mod transaction_manager;

pub use snapshot::Snapshot;
pub use transaction::{Operation, Transaction};
pub use transaction_manager::TransactionManager;
