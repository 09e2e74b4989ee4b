//! A single transaction's operation log, used to undo its effects on
//! rollback.

use crate::mvcc::snapshot::Snapshot;
use crate::row::Row;

/// One undoable mutation performed by a transaction.
#[derive(Clone, Debug)]
pub enum Operation {
    Insert { table: String, row_id: u64 },
    Update { table: String, row_id: u64, pre_image: Row },
    Delete { table: String, row_id: u64, pre_image: Row },
}

pub struct Transaction {
    pub txid: u64,
    pub snapshot: Snapshot,
    pub operations: Vec<Operation>,
}

impl Transaction {
    pub fn new(txid: u64, snapshot: Snapshot) -> Self {
        Transaction { txid, snapshot, operations: Vec::new() }
    }

    pub fn record(&mut self, op: Operation) {
        self.operations.push(op);
    }
}

#[cfg(test)]
mod transaction_test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn records_operations_in_order() {
        let mut tx = Transaction::new(1, Snapshot::new(1, HashSet::new(), 0));
        tx.record(Operation::Insert { table: "t".to_string(), row_id: 1 });
        tx.record(Operation::Insert { table: "t".to_string(), row_id: 2 });
        assert_eq!(tx.operations.len(), 2);
    }
}
