//! Transaction manager: txid allocation, active-transaction stack, and CLOG
//! drive.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::clog::{Clog, TxStatus};
use crate::error::{CResult, Error};
use crate::mvcc::snapshot::Snapshot;
use crate::mvcc::transaction::{Operation, Transaction};

struct Inner {
    active_txs: std::collections::HashMap<u64, Transaction>,
    tx_stack: Vec<u64>,
}

pub struct TransactionManager {
    next_tx_id: AtomicU64,
    clog: Clog,
    inner: Mutex<Inner>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            next_tx_id: AtomicU64::new(1),
            clog: Clog::new(),
            inner: Mutex::new(Inner { active_txs: std::collections::HashMap::new(), tx_stack: Vec::new() }),
        }
    }

    /// Reconstitutes a manager whose next txid and CLOG came from recovery.
    pub fn from_recovered(next_tx_id: u64, clog: Clog) -> Self {
        TransactionManager {
            next_tx_id: AtomicU64::new(next_tx_id),
            clog,
            inner: Mutex::new(Inner { active_txs: std::collections::HashMap::new(), tx_stack: Vec::new() }),
        }
    }

    pub fn clog(&self) -> &Clog {
        &self.clog
    }

    pub fn begin(&self) -> u64 {
        let txid = self.next_tx_id.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.inner.lock().expect("transaction manager mutex poisoned");
        let active_set: HashSet<u64> = inner.active_txs.keys().copied().collect();
        let snapshot = Snapshot::new(txid, active_set, now());

        self.clog.set(txid, TxStatus::InProgress);
        inner.active_txs.insert(txid, Transaction::new(txid, snapshot));
        inner.tx_stack.push(txid);
        txid
    }

    /// The innermost currently-executing transaction, if any.
    pub fn current_txid(&self) -> Option<u64> {
        let inner = self.inner.lock().expect("transaction manager mutex poisoned");
        inner.tx_stack.last().copied()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().expect("transaction manager mutex poisoned").active_txs.len()
    }

    /// The lowest txid among currently active transactions, or the next
    /// txid to be assigned if none are active -- everything committed so
    /// far is then safe to vacuum.
    pub fn oldest_active_txid(&self) -> u64 {
        let inner = self.inner.lock().expect("transaction manager mutex poisoned");
        inner.active_txs.keys().copied().min().unwrap_or_else(|| self.next_tx_id.load(AtomicOrdering::SeqCst))
    }

    pub fn record_operation(&self, txid: u64, op: Operation) -> CResult<()> {
        let mut inner = self.inner.lock().expect("transaction manager mutex poisoned");
        let tx = inner.active_txs.get_mut(&txid).ok_or(Error::TransactionNotActive(txid))?;
        tx.record(op);
        Ok(())
    }

    pub fn snapshot(&self, txid: u64) -> CResult<Snapshot> {
        let inner = self.inner.lock().expect("transaction manager mutex poisoned");
        inner
            .active_txs
            .get(&txid)
            .map(|tx| tx.snapshot.clone())
            .ok_or(Error::TransactionNotActive(txid))
    }

    /// Snapshot for reads outside an explicit transaction: always sees every
    /// committed write with no still-active exclusions.
    pub fn implicit_snapshot(&self) -> Snapshot {
        let next = self.next_tx_id.load(AtomicOrdering::SeqCst);
        Snapshot::new(next.saturating_sub(1), HashSet::new(), now())
    }

    pub fn commit(&self, txid: u64) -> CResult<()> {
        let mut inner = self.inner.lock().expect("transaction manager mutex poisoned");
        match inner.tx_stack.last() {
            Some(top) if *top == txid => {
                inner.tx_stack.pop();
            }
            _ => return Err(Error::TransactionNotActive(txid)),
        }
        self.clog.set(txid, TxStatus::Committed);
        inner.active_txs.remove(&txid);
        Ok(())
    }

    /// Pops the transaction's operation log so the caller can reverse it;
    /// marks the transaction aborted in the CLOG.
    pub fn rollback(&self, txid: u64) -> CResult<Vec<Operation>> {
        let mut inner = self.inner.lock().expect("transaction manager mutex poisoned");
        match inner.tx_stack.last() {
            Some(top) if *top == txid => {
                inner.tx_stack.pop();
            }
            _ => return Err(Error::TransactionNotActive(txid)),
        }
        self.clog.set(txid, TxStatus::Aborted);
        let tx = inner.active_txs.remove(&txid).ok_or(Error::TransactionNotActive(txid))?;
        let mut ops = tx.operations;
        ops.reverse();
        Ok(ops)
    }
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod transaction_manager_test {
    use super::*;

    #[test]
    fn begin_assigns_monotonic_txids_and_snapshots_active_set() {
        let tm = TransactionManager::new();
        let t1 = tm.begin();
        let t2 = tm.begin();
        assert!(t2 > t1);
        let snap2 = tm.snapshot(t2).unwrap();
        assert!(snap2.active_txid_set.contains(&t1));
    }

    #[test]
    fn commit_requires_stack_top_match() {
        let tm = TransactionManager::new();
        let t1 = tm.begin();
        let t2 = tm.begin();
        assert!(tm.commit(t1).is_err());
        tm.commit(t2).unwrap();
        tm.commit(t1).unwrap();
    }

    #[test]
    fn rollback_returns_operations_in_lifo_order() {
        let tm = TransactionManager::new();
        let t1 = tm.begin();
        tm.record_operation(t1, Operation::Insert { table: "t".into(), row_id: 1 }).unwrap();
        tm.record_operation(t1, Operation::Insert { table: "t".into(), row_id: 2 }).unwrap();
        let ops = tm.rollback(t1).unwrap();
        match &ops[0] {
            Operation::Insert { row_id, .. } => assert_eq!(*row_id, 2),
            _ => panic!("wrong variant"),
        }
    }
}
