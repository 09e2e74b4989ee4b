//! Snapshot visibility.

use std::collections::HashSet;

use crate::clog::{Clog, TxStatus};

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub txid: u64,
    pub active_txid_set: HashSet<u64>,
    pub timestamp: i64,
}

impl Snapshot {
    pub fn new(txid: u64, active_txid_set: HashSet<u64>, timestamp: i64) -> Self {
        Snapshot { txid, active_txid_set, timestamp }
    }

    /// Visibility rule for a row version with creator `xmin` and optional
    /// deleter/superseder `xmax`, against `clog`.
    pub fn is_visible(&self, xmin: u64, xmax: Option<u64>, clog: &Clog) -> bool {
        if !clog.is_committed(xmin) {
            return false;
        }
        if xmin > self.txid {
            return false;
        }
        if self.active_txid_set.contains(&xmin) {
            return false;
        }
        match xmax {
            None => true,
            Some(xmax) => {
                clog.status(xmax) != TxStatus::Committed
                    || xmax > self.txid
                    || self.active_txid_set.contains(&xmax)
            }
        }
    }
}

#[cfg(test)]
mod snapshot_test {
    use super::*;

    #[test]
    fn s4_mvcc_visibility() {
        let clog = Clog::new();

        // Txn A (txid 1) begins and inserts row 1, then commits.
        clog.set(1, TxStatus::InProgress);
        let snapshot_a = Snapshot::new(1, HashSet::new(), 0);

        // Txn B (txid 2) begins before A commits; A is still active.
        let mut active_for_b: HashSet<u64> = HashSet::new();
        active_for_b.insert(1);
        let snapshot_b = Snapshot::new(2, active_for_b, 0);
        assert!(!snapshot_b.is_visible(1, None, &clog));

        clog.set(1, TxStatus::Committed);
        // B's snapshot was captured while A was active, so it's still invisible.
        assert!(!snapshot_b.is_visible(1, None, &clog));

        // Txn C begins after A commits.
        let snapshot_c = Snapshot::new(3, HashSet::new(), 0);
        assert!(snapshot_c.is_visible(1, None, &clog));

        // snapshot_a (captured at commit time) should also see its own insert.
        assert!(snapshot_a.is_visible(1, None, &clog));
    }

    #[test]
    fn deleted_row_invisible_once_deleter_commits_before_snapshot() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        clog.set(2, TxStatus::Committed);

        let snapshot = Snapshot::new(3, HashSet::new(), 0);
        assert!(!snapshot.is_visible(1, Some(2), &clog));
    }

    #[test]
    fn bootstrap_txid_always_visible() {
        let clog = Clog::new();
        let snapshot = Snapshot::new(5, HashSet::new(), 0);
        assert!(snapshot.is_visible(0, None, &clog));
    }
}
