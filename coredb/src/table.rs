//! Table: schema plus row version chains.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use crate::clog::Clog;
use crate::error::{CResult, Error};
use crate::mvcc::Snapshot;
use crate::row::{Row, RowVersion};
use crate::schema::{ColumnDef, Schema};

/// Read-only schema introspection for front ends that have no SQL parser
/// to fall back on.
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

pub struct Table {
    pub name: String,
    pub schema: Schema,
    rows: Mutex<HashMap<u64, RowVersion>>,
    next_row_id: AtomicU64,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Table { name: name.into(), schema, rows: Mutex::new(HashMap::new()), next_row_id: AtomicU64::new(1) }
    }

    /// Reconstitutes a table whose row ids must not collide with recovered data.
    pub fn with_next_row_id(name: impl Into<String>, schema: Schema, next_row_id: u64) -> Self {
        Table {
            name: name.into(),
            schema,
            rows: Mutex::new(HashMap::new()),
            next_row_id: AtomicU64::new(next_row_id),
        }
    }

    pub fn next_row_id_hint(&self) -> u64 {
        self.next_row_id.load(AtomicOrdering::SeqCst)
    }

    pub fn describe(&self) -> TableDescription {
        TableDescription { name: self.name.clone(), columns: self.schema.columns.clone() }
    }

    pub fn insert(&self, values: Row, txid: u64) -> u64 {
        let row_id = self.next_row_id.fetch_add(1, AtomicOrdering::SeqCst);
        self.insert_with_row_id(row_id, values, txid);
        row_id
    }

    /// Inserts at a caller-chosen row id. Used by WAL recovery, which must
    /// preserve the original row ids.
    pub fn insert_with_row_id(&self, row_id: u64, values: Row, txid: u64) {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        rows.insert(row_id, RowVersion::new(values, txid));
        drop(rows);
        self.bump_next_row_id_past(row_id);
    }

    fn bump_next_row_id_past(&self, row_id: u64) {
        let mut current = self.next_row_id.load(AtomicOrdering::SeqCst);
        while row_id >= current {
            match self.next_row_id.compare_exchange(
                current,
                row_id + 1,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Walks the chain newest-first and returns the first version visible to
    /// `snapshot`.
    pub fn get(&self, row_id: u64, snapshot: &Snapshot, clog: &Clog) -> Option<Row> {
        let rows = self.rows.lock().expect("table row-map mutex poisoned");
        let mut current = rows.get(&row_id);
        while let Some(version) = current {
            if snapshot.is_visible(version.xmin, version.xmax, clog) {
                return Some(version.values.clone());
            }
            current = version.next.as_deref();
        }
        None
    }

    pub fn update(&self, row_id: u64, new_values: Row, txid: u64) -> CResult<Row> {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        let head = rows.get_mut(&row_id).ok_or(Error::RowNotFound(row_id))?;
        let pre_image = head.values.clone();
        head.xmax = Some(txid);
        let old_head = std::mem::replace(head, RowVersion::new(new_values, txid));
        head.next = Some(Box::new(old_head));
        Ok(pre_image)
    }

    pub fn delete(&self, row_id: u64, txid: u64) -> CResult<Row> {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        let head = rows.get_mut(&row_id).ok_or(Error::RowNotFound(row_id))?;
        let pre_image = head.values.clone();
        head.xmax = Some(txid);
        Ok(pre_image)
    }

    /// Undoes a delete (used by transaction rollback): clears xmax on the
    /// current head.
    pub fn undo_delete(&self, row_id: u64) -> CResult<()> {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        let head = rows.get_mut(&row_id).ok_or(Error::RowNotFound(row_id))?;
        head.xmax = None;
        Ok(())
    }

    /// Undoes an update (used by transaction rollback): discards the
    /// version this transaction pushed and restores the prior head, with
    /// its xmax cleared.
    pub fn undo_update(&self, row_id: u64, _pre_image: Row) -> CResult<()> {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        let head = rows.get_mut(&row_id).ok_or(Error::RowNotFound(row_id))?;
        let prior = head.next.take().ok_or_else(|| {
            Error::Internal(format!("row {row_id} has no prior version to restore on rollback"))
        })?;
        *head = *prior;
        head.xmax = None;
        Ok(())
    }

    /// Returns the current head's values regardless of MVCC visibility.
    /// Used when undoing a rollback needs to know what an in-progress
    /// transaction's own write looked like (visibility rules would hide it
    /// from every snapshot, including the writer's own, until commit).
    pub fn peek_values(&self, row_id: u64) -> Option<Row> {
        let rows = self.rows.lock().expect("table row-map mutex poisoned");
        rows.get(&row_id).map(|head| head.values.clone())
    }

    /// Physically removes a row inserted by a rolled-back transaction.
    pub fn undo_insert(&self, row_id: u64) {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        rows.remove(&row_id);
    }

    pub fn scan(&self, snapshot: &Snapshot, clog: &Clog) -> Vec<(u64, Row)> {
        let rows = self.rows.lock().expect("table row-map mutex poisoned");
        let mut out = Vec::new();
        for (row_id, version) in rows.iter() {
            let mut current = Some(version);
            while let Some(v) = current {
                if snapshot.is_visible(v.xmin, v.xmax, clog) {
                    out.push((*row_id, v.values.clone()));
                    break;
                }
                current = v.next.as_deref();
            }
        }
        out.sort_by_key(|(row_id, _)| *row_id);
        out
    }

    /// Reclaims versions no longer visible to any possible future snapshot:
    /// those whose xmax is committed and below `oldest_active_txid`. Returns
    /// the number of versions physically removed.
    pub fn vacuum(&self, oldest_active_txid: u64, clog: &Clog) -> usize {
        let mut rows = self.rows.lock().expect("table row-map mutex poisoned");
        let mut reclaimed = 0;
        let mut to_delete = Vec::new();

        for (row_id, head) in rows.iter_mut() {
            if let Some(xmax) = head.xmax {
                if clog.is_committed(xmax) && xmax < oldest_active_txid {
                    // The whole chain is dead: the head was deleted by a
                    // transaction old enough that no snapshot can still see it.
                    to_delete.push(*row_id);
                    continue;
                }
            }
            reclaimed += prune_chain(head, oldest_active_txid, clog);
        }

        for row_id in &to_delete {
            if let Some(head) = rows.remove(row_id) {
                reclaimed += 1 + count_versions(head.next.as_deref());
            }
        }
        reclaimed
    }
}

fn count_versions(version: Option<&RowVersion>) -> usize {
    match version {
        None => 0,
        Some(v) => 1 + count_versions(v.next.as_deref()),
    }
}

/// Drops any tail version of `head`'s chain that is dead (its xmax
/// committed below `oldest_active_txid`), since no live snapshot can reach
/// past a dead version to an older one.
fn prune_chain(head: &mut RowVersion, oldest_active_txid: u64, clog: &Clog) -> usize {
    let mut reclaimed = 0;
    let mut current = head;
    loop {
        let should_cut = match current.next.as_deref() {
            Some(next) => match next.xmax {
                Some(xmax) => clog.is_committed(xmax) && xmax < oldest_active_txid,
                None => false,
            },
            None => false,
        };
        if should_cut {
            if let Some(cut) = current.next.take() {
                reclaimed += 1 + count_versions(cut.next.as_deref());
            }
            break;
        }
        match current.next.as_deref_mut() {
            Some(next) => current = next,
            None => break,
        }
    }
    reclaimed
}

#[cfg(test)]
mod table_test {
    use super::*;
    use crate::clog::TxStatus;
    use crate::schema::{ColumnDef, ColumnType};
    use crate::value::Value;
    use std::collections::HashSet;

    fn schema() -> Schema {
        Schema::new(vec![ColumnDef::new("name", ColumnType::Text)]).unwrap()
    }

    fn row(name: &str) -> Row {
        let mut r = Row::new();
        r.set("name", Value::Text(name.to_string()));
        r
    }

    fn snapshot(txid: u64, active: &[u64]) -> Snapshot {
        Snapshot::new(txid, active.iter().copied().collect(), 0)
    }

    #[test]
    fn insert_then_get_is_visible_to_later_snapshot() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        let table = Table::new("t", schema());
        let row_id = table.insert(row("a"), 1);

        let snap = snapshot(2, &[]);
        let got = table.get(row_id, &snap, &clog).unwrap();
        assert_eq!(got.get("name"), Some(&Value::Text("a".to_string())));
    }

    #[test]
    fn insert_invisible_to_concurrent_snapshot() {
        let clog = Clog::new();
        clog.set(1, TxStatus::InProgress);
        let table = Table::new("t", schema());
        let row_id = table.insert(row("a"), 1);

        let snap = snapshot(2, &[1]);
        assert!(table.get(row_id, &snap, &clog).is_none());
    }

    #[test]
    fn update_creates_new_head_and_old_version_stays_visible_to_old_snapshot() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        clog.set(2, TxStatus::Committed);
        let table = Table::new("t", schema());
        let row_id = table.insert(row("a"), 1);

        let snap_before_update = snapshot(2, &[]);
        table.update(row_id, row("b"), 2).unwrap();

        let snap_after = snapshot(3, &[]);
        assert_eq!(table.get(row_id, &snap_after, &clog).unwrap().get("name"), Some(&Value::Text("b".to_string())));
        assert_eq!(
            table.get(row_id, &snap_before_update, &clog).unwrap().get("name"),
            Some(&Value::Text("a".to_string()))
        );
    }

    #[test]
    fn delete_sets_xmax_and_row_invisible_afterward() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        clog.set(2, TxStatus::Committed);
        let table = Table::new("t", schema());
        let row_id = table.insert(row("a"), 1);
        table.delete(row_id, 2).unwrap();

        let snap = snapshot(3, &[]);
        assert!(table.get(row_id, &snap, &clog).is_none());
    }

    #[test]
    fn vacuum_reclaims_versions_invisible_to_any_future_snapshot() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        clog.set(2, TxStatus::Committed);
        let table = Table::new("t", schema());
        let row_id = table.insert(row("a"), 1);
        table.update(row_id, row("b"), 2).unwrap();

        let reclaimed = table.vacuum(3, &clog);
        assert_eq!(reclaimed, 1);

        let snap = snapshot(10, &[]);
        assert_eq!(table.get(row_id, &snap, &clog).unwrap().get("name"), Some(&Value::Text("b".to_string())));
    }

    #[test]
    fn scan_returns_rows_sorted_by_row_id() {
        let clog = Clog::new();
        clog.set(1, TxStatus::Committed);
        let table = Table::new("t", schema());
        table.insert(row("a"), 1);
        table.insert(row("b"), 1);
        table.insert(row("c"), 1);

        let snap = snapshot(2, &[]);
        let all = table.scan(&snap, &clog);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
