//! `Database`: composes the transaction manager, tables, index manager and
//! per-dimension HNSW graphs behind one `execute(Command)` surface.
//! Embedding auto-indexing is a DB-level policy, not a Table-level one.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use crate::clog::Clog;
use crate::command::{AlterAction, Assignment, Command, OrderBy, Predicate, QueryResult};
use crate::config::DbConfig;
use crate::error::{CResult, Error};
use crate::hnsw::{self, HnswGraph};
use crate::index_manager::IndexManager;
use crate::mvcc::{Operation, Snapshot, TransactionManager};
use crate::persistence::{self, DbPaths, DbStatus};
use crate::row::Row;
use crate::schema::{ColumnType, Schema};
use crate::table::Table;
use crate::value::Value;
use crate::wal::{plan_recovery, RecordType, WalWriter};

pub struct Database {
    config: DbConfig,
    paths: DbPaths,
    tm: TransactionManager,
    tables: RwLock<HashMap<String, Table>>,
    index_manager: IndexManager,
    hnsw_graphs: RwLock<HashMap<usize, HnswGraph>>,
    wal: Mutex<WalWriter>,
    checkpoint_sequence: Mutex<u64>,
}

impl Database {
    /// Opens (or creates, if empty) a database rooted at `root`: loads any
    /// CLOG/table/HNSW snapshots present, then replays the WAL tail left
    /// since the last checkpoint.
    pub fn open(root: impl Into<PathBuf>, config: DbConfig) -> CResult<Self> {
        let paths = DbPaths::new(root.into());
        paths.ensure_dirs()?;

        let clog = if paths.clog_path().exists() { Clog::load(&paths.clog_path())? } else { Clog::new() };

        let mut tables = HashMap::new();
        for entry in fs::read_dir(paths.tables_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let table = persistence::load_table(&name, &entry.path())?;
            tables.insert(name, table);
        }

        let mut hnsw_graphs = HashMap::new();
        for entry in fs::read_dir(paths.hnsw_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(dim) = name.parse::<usize>() {
                hnsw_graphs.insert(dim, hnsw::load(&entry.path())?);
            }
        }

        let next_tx_id = recover(&paths, &config, &mut tables, &mut hnsw_graphs, &clog)?;
        log::info!("recovery complete, next txid {next_tx_id}");
        let tm = TransactionManager::from_recovered(next_tx_id, clog);

        let wal = WalWriter::open(paths.wal_dir(), config.wal_max_file_size, config.wal_max_total_size)?;

        Ok(Database {
            config,
            paths,
            tm,
            tables: RwLock::new(tables),
            index_manager: IndexManager::new(),
            hnsw_graphs: RwLock::new(hnsw_graphs),
            wal: Mutex::new(wal),
            checkpoint_sequence: Mutex::new(0),
        })
    }

    pub fn execute(&self, command: Command) -> CResult<QueryResult> {
        match command {
            Command::Begin => {
                let txid = self.tm.begin();
                self.wal_append(RecordType::Begin, txid, 0, "", vec![])?;
                Ok(QueryResult::TxId(txid))
            }
            Command::Commit => {
                let txid = self.tm.current_txid().ok_or(Error::NoActiveTransaction)?;
                self.tm.commit(txid)?;
                self.wal_append(RecordType::Commit, txid, 0, "", vec![])?;
                Ok(QueryResult::TxId(txid))
            }
            Command::Rollback => {
                let txid = self.tm.current_txid().ok_or(Error::NoActiveTransaction)?;
                let ops = self.tm.rollback(txid)?;
                self.wal_append(RecordType::Rollback, txid, 0, "", vec![])?;
                self.undo_operations(&ops);
                Ok(QueryResult::TxId(txid))
            }
            Command::CreateTable { name, columns } => self.create_table(name, columns),
            Command::DropTable { name, if_exists } => self.drop_table(name, if_exists),
            Command::AlterTable { name, action } => self.alter_table(name, action),
            Command::CreateIndex { name, table, column } => self.create_index(name, table, column),
            Command::DropIndex { name } => {
                self.index_manager.drop_index(&name)?;
                Ok(QueryResult::Unit)
            }
            Command::Insert { table, values } => self.insert(table, values),
            Command::Select { table, predicate, order_by, limit } => self.select(table, predicate, order_by, limit),
            Command::Update { table, assignments, predicate } => self.update(table, assignments, predicate),
            Command::Delete { table, predicate } => self.delete(table, predicate),
            Command::Vacuum { table } => self.vacuum(table),
        }
    }

    /// Wraps `body` in an implicit single-statement transaction when no
    /// explicit BEGIN is active, rolling back and undoing on error.
    fn with_transaction<T>(&self, body: impl FnOnce(u64) -> CResult<T>) -> CResult<T> {
        match self.tm.current_txid() {
            Some(txid) => body(txid),
            None => {
                let txid = self.tm.begin();
                self.wal_append(RecordType::Begin, txid, 0, "", vec![])?;
                match body(txid) {
                    Ok(value) => {
                        self.tm.commit(txid)?;
                        self.wal_append(RecordType::Commit, txid, 0, "", vec![])?;
                        Ok(value)
                    }
                    Err(err) => {
                        let ops = self.tm.rollback(txid)?;
                        self.wal_append(RecordType::Rollback, txid, 0, "", vec![])?;
                        self.undo_operations(&ops);
                        Err(err)
                    }
                }
            }
        }
    }

    fn wal_append(&self, record_type: RecordType, txid: u64, row_id: u64, table: &str, data: Vec<u8>) -> CResult<u64> {
        self.wal.lock().expect("wal writer mutex poisoned").append(record_type, txid, row_id, table, data)
    }

    fn read_snapshot(&self) -> CResult<Snapshot> {
        match self.tm.current_txid() {
            Some(txid) => self.tm.snapshot(txid),
            None => Ok(self.tm.implicit_snapshot()),
        }
    }

    fn create_table(&self, name: String, columns: Vec<crate::schema::ColumnDef>) -> CResult<QueryResult> {
        let mut tables = self.tables.write().expect("tables lock poisoned");
        if tables.contains_key(&name) {
            return Err(Error::TableAlreadyExists(name));
        }
        let schema = Schema::new(columns)?;
        tables.insert(name.clone(), Table::new(name, schema));
        Ok(QueryResult::Unit)
    }

    fn drop_table(&self, name: String, if_exists: bool) -> CResult<QueryResult> {
        let mut tables = self.tables.write().expect("tables lock poisoned");
        if tables.remove(&name).is_none() && !if_exists {
            return Err(Error::TableNotFound(name));
        }
        Ok(QueryResult::Unit)
    }

    fn alter_table(&self, name: String, action: AlterAction) -> CResult<QueryResult> {
        let mut tables = self.tables.write().expect("tables lock poisoned");
        let table = tables.get_mut(&name).ok_or_else(|| Error::TableNotFound(name.clone()))?;
        match action {
            AlterAction::AddColumn(col) => table.schema.add_column(col)?,
            AlterAction::DropColumn(col) => table.schema.drop_column(&col)?,
            AlterAction::RenameColumn { old, new } => table.schema.rename_column(&old, &new)?,
        }
        Ok(QueryResult::Unit)
    }

    /// Registers a named index and backfills it from the table's current
    /// visible rows.
    fn create_index(&self, name: String, table_name: String, column: String) -> CResult<QueryResult> {
        let tables = self.tables.read().expect("tables lock poisoned");
        let table = tables.get(&table_name).ok_or_else(|| Error::TableNotFound(table_name.clone()))?;
        table.schema.column(&column).ok_or_else(|| Error::ColumnNotFound(column.clone()))?;

        self.index_manager.create_index(&name, &table_name, &column)?;
        let snapshot = self.tm.implicit_snapshot();
        for (row_id, row) in table.scan(&snapshot, self.tm.clog()) {
            if let Some(value) = row.get(&column) {
                self.index_manager.insert_entry(&name, value.clone(), row_id)?;
            }
        }
        Ok(QueryResult::Unit)
    }

    fn insert(&self, table_name: String, values: Row) -> CResult<QueryResult> {
        self.with_transaction(|txid| {
            let tables = self.tables.read().expect("tables lock poisoned");
            let table = tables.get(&table_name).ok_or_else(|| Error::TableNotFound(table_name.clone()))?;
            validate_row(&table.schema, &values)?;

            let row_id = table.insert(values.clone(), txid);
            self.tm.record_operation(txid, Operation::Insert { table: table_name.clone(), row_id })?;
            self.wal_append(RecordType::Insert, txid, row_id, &table_name, encode_row(&values)?)?;
            self.add_indexed_entries(&table_name, &table.schema, row_id, &values);
            self.index_embeddings_on_insert(&table.schema, row_id, &values)?;
            Ok(QueryResult::RowId(row_id))
        })
    }

    fn select(
        &self,
        table_name: String,
        predicate: Option<Predicate>,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> CResult<QueryResult> {
        let snapshot = self.read_snapshot()?;
        let tables = self.tables.read().expect("tables lock poisoned");
        let table = tables.get(&table_name).ok_or_else(|| Error::TableNotFound(table_name.clone()))?;

        let mut rows = match &predicate {
            Some(predicate) => self.filtered_rows(table, &table_name, predicate, &snapshot)?,
            None => table.scan(&snapshot, self.tm.clog()),
        };

        if let Some(order_by) = order_by {
            self.apply_order_by(&mut rows, order_by);
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(QueryResult::Rows(rows))
    }

    fn update(&self, table_name: String, assignments: Vec<Assignment>, predicate: Option<Predicate>) -> CResult<QueryResult> {
        self.with_transaction(|txid| {
            let tables = self.tables.read().expect("tables lock poisoned");
            let table = tables.get(&table_name).ok_or_else(|| Error::TableNotFound(table_name.clone()))?;
            let snapshot = self.tm.snapshot(txid)?;
            let candidates = match &predicate {
                Some(predicate) => self.filtered_rows(table, &table_name, predicate, &snapshot)?,
                None => table.scan(&snapshot, self.tm.clog()),
            };

            let mut count = 0;
            for (row_id, old_row) in candidates {
                let mut new_row = old_row.clone();
                for assignment in &assignments {
                    new_row.set(assignment.column.clone(), assignment.value.clone());
                }
                validate_row(&table.schema, &new_row)?;

                table.update(row_id, new_row.clone(), txid)?;
                self.tm.record_operation(
                    txid,
                    Operation::Update { table: table_name.clone(), row_id, pre_image: old_row.clone() },
                )?;
                self.wal_append(RecordType::Update, txid, row_id, &table_name, encode_row(&new_row)?)?;
                for assignment in &assignments {
                    self.index_manager.on_column_changed(
                        &table_name,
                        &assignment.column,
                        row_id,
                        old_row.get(&assignment.column),
                        new_row.get(&assignment.column),
                    );
                }
                count += 1;
            }
            Ok(QueryResult::Count(count))
        })
    }

    fn delete(&self, table_name: String, predicate: Option<Predicate>) -> CResult<QueryResult> {
        self.with_transaction(|txid| {
            let tables = self.tables.read().expect("tables lock poisoned");
            let table = tables.get(&table_name).ok_or_else(|| Error::TableNotFound(table_name.clone()))?;
            let snapshot = self.tm.snapshot(txid)?;
            let candidates = match &predicate {
                Some(predicate) => self.filtered_rows(table, &table_name, predicate, &snapshot)?,
                None => table.scan(&snapshot, self.tm.clog()),
            };

            let mut count = 0;
            for (row_id, row) in candidates {
                table.delete(row_id, txid)?;
                self.tm.record_operation(
                    txid,
                    Operation::Delete { table: table_name.clone(), row_id, pre_image: row.clone() },
                )?;
                self.wal_append(RecordType::Delete, txid, row_id, &table_name, vec![])?;
                self.remove_indexed_entries(&table_name, &table.schema, row_id, &row);
                count += 1;
            }
            Ok(QueryResult::Count(count))
        })
    }

    fn vacuum(&self, table_name: Option<String>) -> CResult<QueryResult> {
        let tables = self.tables.read().expect("tables lock poisoned");
        let oldest_active = self.tm.oldest_active_txid();
        let clog = self.tm.clog();

        let mut reclaimed = 0;
        match table_name {
            Some(name) => {
                let table = tables.get(&name).ok_or_else(|| Error::TableNotFound(name.clone()))?;
                reclaimed += table.vacuum(oldest_active, clog);
            }
            None => {
                for table in tables.values() {
                    reclaimed += table.vacuum(oldest_active, clog);
                }
            }
        }
        log::info!("vacuum reclaimed {reclaimed} row versions");
        Ok(QueryResult::Count(reclaimed))
    }

    /// Forces a CLOG flush, a table snapshot write, an HNSW snapshot
    /// write, and truncates WAL files below the current sequence.
    pub fn checkpoint(&self) -> CResult<u64> {
        let snapshot = self.tm.implicit_snapshot();
        let clog = self.tm.clog();

        let tables = self.tables.read().expect("tables lock poisoned");
        for (name, table) in tables.iter() {
            persistence::save_table(table, &snapshot, clog, &self.paths.table_path(name))?;
        }
        drop(tables);

        clog.save(&self.paths.clog_path())?;

        let graphs = self.hnsw_graphs.read().expect("hnsw map lock poisoned");
        for (dim, graph) in graphs.iter() {
            hnsw::save(graph, &self.paths.hnsw_path(*dim))?;
        }
        drop(graphs);

        let mut wal = self.wal.lock().expect("wal writer mutex poisoned");
        wal.append(RecordType::Checkpoint, 0, 0, "", vec![])?;
        wal.flush()?;
        let sequence = wal.current_sequence();
        wal.truncate_before(sequence)?;
        drop(wal);

        *self.checkpoint_sequence.lock().expect("checkpoint sequence mutex poisoned") = sequence;
        log::info!("checkpoint complete at wal sequence {sequence}");
        Ok(sequence)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.tables.read().expect("tables lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    pub fn status(&self) -> DbStatus {
        let snapshot = self.tm.implicit_snapshot();
        let clog = self.tm.clog();

        let tables = self.tables.read().expect("tables lock poisoned");
        let table_row_counts =
            tables.iter().map(|(name, table)| (name.clone(), table.scan(&snapshot, clog).len())).collect();
        drop(tables);

        let graphs = self.hnsw_graphs.read().expect("hnsw map lock poisoned");
        let hnsw_node_counts = graphs.iter().map(|(dim, graph)| (*dim, graph.node_count())).collect();
        drop(graphs);

        DbStatus {
            table_row_counts,
            active_transactions: self.tm.active_count(),
            wal_bytes_written: self.wal.lock().expect("wal writer mutex poisoned").total_bytes(),
            hnsw_node_counts,
        }
    }

    fn filtered_rows(
        &self,
        table: &Table,
        table_name: &str,
        predicate: &Predicate,
        snapshot: &Snapshot,
    ) -> CResult<Vec<(u64, Row)>> {
        if let Some((column, value)) = predicate.as_equality() {
            if let Some(index_name) = self.index_manager.index_for(table_name, column) {
                let row_ids = self.index_manager.search(&index_name, value)?;
                return Ok(row_ids
                    .into_iter()
                    .filter_map(|row_id| table.get(row_id, snapshot, self.tm.clog()).map(|row| (row_id, row)))
                    .filter(|(_, row)| predicate.matches(row))
                    .collect());
            }
            log::debug!("no index on {table_name}.{column}, falling back to full scan");
        }
        Ok(table.scan(snapshot, self.tm.clog()).into_iter().filter(|(_, row)| predicate.matches(row)).collect())
    }

    fn apply_order_by(&self, rows: &mut Vec<(u64, Row)>, order_by: OrderBy) {
        match order_by {
            OrderBy::Similarity { column: _, query, k } => {
                let dim = query.len();
                let live_ids: std::collections::HashSet<u64> = rows.iter().map(|(row_id, _)| *row_id).collect();
                let graphs = self.hnsw_graphs.read().expect("hnsw map lock poisoned");
                // The graph never removes a node on row delete, so a plain
                // top-k search can burn its budget on dead rows. Widen the
                // fetch until k live hits are found or the whole graph has
                // been searched.
                let hits = graphs
                    .get(&dim)
                    .map(|graph| {
                        let total = graph.node_count();
                        let mut fetch = k;
                        let mut hits = graph.search(&query, fetch);
                        while hits.iter().filter(|hit| live_ids.contains(&hit.external_id)).count() < k
                            && fetch < total
                        {
                            fetch = (fetch * 2).max(fetch + 1).min(total);
                            hits = graph.search(&query, fetch);
                        }
                        hits
                    })
                    .unwrap_or_default();
                drop(graphs);

                let rank: HashMap<u64, usize> = hits
                    .iter()
                    .filter(|hit| live_ids.contains(&hit.external_id))
                    .enumerate()
                    .map(|(index, hit)| (hit.external_id, index))
                    .collect();
                rows.retain(|(row_id, _)| rank.contains_key(row_id));
                rows.sort_by_key(|(row_id, _)| rank[row_id]);
            }
            // Intentionally nondeterministic.
            OrderBy::Vibes => {}
        }
    }

    fn add_indexed_entries(&self, table_name: &str, schema: &Schema, row_id: u64, row: &Row) {
        for column in &schema.columns {
            if let Some(value) = row.get(&column.name) {
                for index_name in self.index_manager.names_for(table_name, &column.name) {
                    let _ = self.index_manager.insert_entry(&index_name, value.clone(), row_id);
                }
            }
        }
    }

    fn remove_indexed_entries(&self, table_name: &str, schema: &Schema, row_id: u64, row: &Row) {
        for column in &schema.columns {
            if let Some(value) = row.get(&column.name) {
                for index_name in self.index_manager.names_for(table_name, &column.name) {
                    let _ = self.index_manager.remove_entry(&index_name, value, row_id);
                }
            }
        }
    }

    /// Pushes an embedding column's vector into its dimension's HNSW graph,
    /// using the row id as the external id. Rows already present (e.g.
    /// during idempotent recovery) are left alone.
    fn index_embeddings_on_insert(&self, schema: &Schema, row_id: u64, row: &Row) -> CResult<()> {
        for column in schema.embedding_columns() {
            if let Some(Value::Embedding(vector)) = row.get(&column.name) {
                let dim = column.col_type.embedding_dim().expect("embedding column carries a dimension");
                self.ensure_hnsw_graph(dim);
                let graphs = self.hnsw_graphs.read().expect("hnsw map lock poisoned");
                let graph = graphs.get(&dim).expect("hnsw graph just ensured to exist");
                if graph.get_internal_id(row_id).is_none() {
                    graph.insert(Some(row_id), vector.clone(), None)?;
                }
            }
        }
        Ok(())
    }

    fn ensure_hnsw_graph(&self, dim: usize) {
        let exists = self.hnsw_graphs.read().expect("hnsw map lock poisoned").contains_key(&dim);
        if !exists {
            let mut graphs = self.hnsw_graphs.write().expect("hnsw map lock poisoned");
            graphs
                .entry(dim)
                .or_insert_with(|| HnswGraph::new(dim, self.config.hnsw_m, self.config.hnsw_ef_construction));
        }
    }

    /// Reverses a rolled-back transaction's operation log (already
    /// LIFO-ordered by `TransactionManager::rollback`), undoing both row
    /// state and the index entries that mirrored it.
    fn undo_operations(&self, ops: &[Operation]) {
        let tables = self.tables.read().expect("tables lock poisoned");
        for op in ops {
            match op {
                Operation::Insert { table: table_name, row_id } => {
                    if let Some(table) = tables.get(table_name) {
                        if let Some(values) = table.peek_values(*row_id) {
                            self.remove_indexed_entries(table_name, &table.schema, *row_id, &values);
                        }
                        table.undo_insert(*row_id);
                    }
                }
                Operation::Update { table: table_name, row_id, pre_image } => {
                    if let Some(table) = tables.get(table_name) {
                        let current = table.peek_values(*row_id);
                        if table.undo_update(*row_id, pre_image.clone()).is_ok() {
                            if let Some(current) = current {
                                for column in &table.schema.columns {
                                    self.index_manager.on_column_changed(
                                        table_name,
                                        &column.name,
                                        *row_id,
                                        current.get(&column.name),
                                        pre_image.get(&column.name),
                                    );
                                }
                            }
                        }
                    }
                }
                Operation::Delete { table: table_name, row_id, pre_image } => {
                    if let Some(table) = tables.get(table_name) {
                        if table.undo_delete(*row_id).is_ok() {
                            self.add_indexed_entries(table_name, &table.schema, *row_id, pre_image);
                        }
                    }
                }
            }
        }
    }
}

fn validate_row(schema: &Schema, row: &Row) -> CResult<()> {
    for (name, value) in &row.0 {
        let column = schema.column(name).ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
        if let ColumnType::Embedding { dim } = column.col_type {
            if let Value::Embedding(vector) = value {
                if vector.len() != dim {
                    return Err(Error::DimensionMismatch { expected: dim, got: vector.len() });
                }
            }
        }
    }
    Ok(())
}

fn encode_row(row: &Row) -> CResult<Vec<u8>> {
    serde_json::to_vec(row).map_err(|e| Error::Internal(e.to_string()))
}

fn decode_row(bytes: &[u8]) -> CResult<Row> {
    serde_json::from_slice(bytes).map_err(|e| Error::Internal(e.to_string()))
}

/// Replays the WAL tail against `tables`, pushing recovered embedding
/// values into `hnsw_graphs` along the way. Secondary B+ tree indexes are
/// not WAL-logged, so they are
/// always rebuilt empty here; a front end re-issues CREATE INDEX, which
/// backfills from current table state.
fn recover(
    paths: &DbPaths,
    config: &DbConfig,
    tables: &mut HashMap<String, Table>,
    hnsw_graphs: &mut HashMap<usize, HnswGraph>,
    clog: &Clog,
) -> CResult<u64> {
    let plan = plan_recovery(&paths.wal_dir())?;
    for (txid, status) in &plan.tx_outcome {
        clog.merge_from_wal(*txid, *status);
    }

    let mut applied = 0usize;
    let mut dropped = 0usize;
    for record in &plan.records {
        let table = match tables.get(&record.table_name) {
            Some(table) => table,
            None => {
                log::warn!("recovery: wal record references unknown table {}, skipping", record.table_name);
                dropped += 1;
                continue;
            }
        };
        match record.record_type {
            RecordType::Insert => {
                let row = decode_row(&record.data)?;
                table.insert_with_row_id(record.row_id, row.clone(), record.tx_id);
                apply_embedding_inserts(&table.schema, hnsw_graphs, config, record.row_id, &row)?;
            }
            RecordType::Update => {
                let row = decode_row(&record.data)?;
                let _ = table.update(record.row_id, row.clone(), record.tx_id);
                apply_embedding_inserts(&table.schema, hnsw_graphs, config, record.row_id, &row)?;
            }
            RecordType::Delete => {
                let _ = table.delete(record.row_id, record.tx_id);
            }
            RecordType::Begin | RecordType::Commit | RecordType::Rollback | RecordType::Checkpoint => {}
        }
        applied += 1;
    }
    log::info!("recovery applied {applied} records, dropped {dropped} for unknown tables");

    let mut next_tx_id = clog.max_txid();
    for record in &plan.records {
        next_tx_id = next_tx_id.max(record.tx_id);
    }
    for txid in plan.tx_outcome.keys() {
        next_tx_id = next_tx_id.max(*txid);
    }
    Ok(next_tx_id + 1)
}

fn apply_embedding_inserts(
    schema: &Schema,
    hnsw_graphs: &mut HashMap<usize, HnswGraph>,
    config: &DbConfig,
    row_id: u64,
    row: &Row,
) -> CResult<()> {
    for column in schema.embedding_columns() {
        if let Some(Value::Embedding(vector)) = row.get(&column.name) {
            let dim = column.col_type.embedding_dim().expect("embedding column carries a dimension");
            let graph = hnsw_graphs
                .entry(dim)
                .or_insert_with(|| HnswGraph::new(dim, config.hnsw_m, config.hnsw_ef_construction));
            if graph.get_internal_id(row_id).is_none() {
                graph.insert(Some(row_id), vector.clone(), None)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod db_test {
    use super::*;
    use crate::command::Predicate;
    use crate::schema::{ColumnDef, ColumnType};
    use tempfile::tempdir;

    fn widgets_columns() -> Vec<ColumnDef> {
        vec![ColumnDef::new("name", ColumnType::Text), ColumnDef::new("price", ColumnType::Int)]
    }

    fn row(name: &str, price: i64) -> Row {
        let mut r = Row::new();
        r.set("name", Value::Text(name.to_string()));
        r.set("price", Value::Int(price));
        r
    }

    #[test]
    fn create_insert_select_round_trip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DbConfig::default()).unwrap();
        db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();
        db.execute(Command::Insert { table: "widgets".to_string(), values: row("a", 10) }).unwrap();
        db.execute(Command::Insert { table: "widgets".to_string(), values: row("b", 20) }).unwrap();

        let result = db
            .execute(Command::Select { table: "widgets".to_string(), predicate: None, order_by: None, limit: None })
            .unwrap();
        match result {
            QueryResult::Rows(rows) => assert_eq!(rows.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn s4_mvcc_visibility_across_explicit_transactions() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DbConfig::default()).unwrap();
        db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();

        let a = db.tm.begin();
        db.tm.record_operation(a, Operation::Insert { table: "widgets".to_string(), row_id: 1 }).unwrap();
        {
            let tables = db.tables.read().unwrap();
            let table = tables.get("widgets").unwrap();
            table.insert_with_row_id(1, row("a", 1), a);
        }

        let b = db.tm.begin();
        let snap_b = db.tm.snapshot(b).unwrap();
        let scan_before_commit = {
            let tables = db.tables.read().unwrap();
            tables.get("widgets").unwrap().scan(&snap_b, db.tm.clog())
        };
        assert!(scan_before_commit.is_empty());

        db.tm.commit(a).unwrap();

        let scan_after_commit_same_snapshot = {
            let tables = db.tables.read().unwrap();
            tables.get("widgets").unwrap().scan(&snap_b, db.tm.clog())
        };
        assert!(scan_after_commit_same_snapshot.is_empty());

        let c = db.tm.begin();
        let snap_c = db.tm.snapshot(c).unwrap();
        let scan_c = {
            let tables = db.tables.read().unwrap();
            tables.get("widgets").unwrap().scan(&snap_c, db.tm.clog())
        };
        assert_eq!(scan_c.len(), 1);
    }

    #[test]
    fn update_and_delete_maintain_secondary_index() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DbConfig::default()).unwrap();
        db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();
        db.execute(Command::CreateIndex { name: "idx_name".to_string(), table: "widgets".to_string(), column: "name".to_string() }).unwrap();
        db.execute(Command::Insert { table: "widgets".to_string(), values: row("a", 1) }).unwrap();

        db.execute(Command::Update {
            table: "widgets".to_string(),
            assignments: vec![Assignment { column: "name".to_string(), value: Value::Text("b".to_string()) }],
            predicate: Some(Predicate::equals("name", Value::Text("a".to_string()))),
        })
        .unwrap();

        let found = db
            .execute(Command::Select {
                table: "widgets".to_string(),
                predicate: Some(Predicate::equals("name", Value::Text("b".to_string()))),
                order_by: None,
                limit: None,
            })
            .unwrap();
        match found {
            QueryResult::Rows(rows) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }

        db.execute(Command::Delete {
            table: "widgets".to_string(),
            predicate: Some(Predicate::equals("name", Value::Text("b".to_string()))),
        })
        .unwrap();
        let after_delete = db
            .execute(Command::Select { table: "widgets".to_string(), predicate: None, order_by: None, limit: None })
            .unwrap();
        match after_delete {
            QueryResult::Rows(rows) => assert!(rows.is_empty()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rollback_undoes_insert_and_its_index_entry() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DbConfig::default()).unwrap();
        db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();
        db.execute(Command::CreateIndex { name: "idx_name".to_string(), table: "widgets".to_string(), column: "name".to_string() }).unwrap();

        db.execute(Command::Begin).unwrap();
        db.execute(Command::Insert { table: "widgets".to_string(), values: row("a", 1) }).unwrap();
        db.execute(Command::Rollback).unwrap();

        let found = db
            .execute(Command::Select {
                table: "widgets".to_string(),
                predicate: Some(Predicate::equals("name", Value::Text("a".to_string()))),
                order_by: None,
                limit: None,
            })
            .unwrap();
        match found {
            QueryResult::Rows(rows) => assert!(rows.is_empty()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn checkpoint_and_reopen_preserves_rows() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), DbConfig::default()).unwrap();
            db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();
            db.execute(Command::Insert { table: "widgets".to_string(), values: row("a", 1) }).unwrap();
            db.checkpoint().unwrap();
        }

        let reopened = Database::open(dir.path(), DbConfig::default()).unwrap();
        let result = reopened
            .execute(Command::Select { table: "widgets".to_string(), predicate: None, order_by: None, limit: None })
            .unwrap();
        match result {
            QueryResult::Rows(rows) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn s5_wal_recovery_drops_uncommitted_tail() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), DbConfig::default()).unwrap();
            db.execute(Command::CreateTable { name: "widgets".to_string(), columns: widgets_columns() }).unwrap();
            db.checkpoint().unwrap();

            for i in 0..900 {
                db.execute(Command::Insert { table: "widgets".to_string(), values: row(&format!("r{i}"), i) })
                    .unwrap();
            }
            // An explicit transaction with no commit simulates a crash mid-write.
            db.execute(Command::Begin).unwrap();
            for i in 900..1000 {
                db.execute(Command::Insert { table: "widgets".to_string(), values: row(&format!("r{i}"), i) })
                    .unwrap();
            }
        }

        let reopened = Database::open(dir.path(), DbConfig::default()).unwrap();
        let result = reopened
            .execute(Command::Select { table: "widgets".to_string(), predicate: None, order_by: None, limit: None })
            .unwrap();
        match result {
            QueryResult::Rows(rows) => assert_eq!(rows.len(), 900),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn similarity_search_skips_deleted_rows_and_still_returns_k_live_hits() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DbConfig::default()).unwrap();
        db.execute(Command::CreateTable {
            name: "points".to_string(),
            columns: vec![
                ColumnDef::new("label", ColumnType::Text),
                ColumnDef::new("v", ColumnType::Embedding { dim: 3 }),
            ],
        })
        .unwrap();

        let mut points = Row::new();
        let vectors = [[1.0_f32, 0.0, 0.0], [0.99, 0.01, 0.0], [0.0, 1.0, 0.0]];
        for (label, v) in ["nearest", "second", "far"].iter().zip(vectors.iter()) {
            points.set("label", Value::Text(label.to_string()));
            points.set("v", Value::Embedding(v.to_vec()));
            db.execute(Command::Insert { table: "points".to_string(), values: points.clone() }).unwrap();
        }

        db.execute(Command::Delete {
            table: "points".to_string(),
            predicate: Some(Predicate::equals("label", Value::Text("nearest".to_string()))),
        })
        .unwrap();

        let result = db
            .execute(Command::Select {
                table: "points".to_string(),
                predicate: None,
                order_by: Some(OrderBy::Similarity { column: "v".to_string(), query: vec![1.0, 0.0, 0.0], k: 2 }),
                limit: None,
            })
            .unwrap();
        match result {
            QueryResult::Rows(rows) => {
                assert_eq!(rows.len(), 2, "deleted row must not consume a live result slot");
                let labels: Vec<_> =
                    rows.iter().map(|(_, r)| r.get("label").cloned().unwrap()).collect();
                assert!(!labels.contains(&Value::Text("nearest".to_string())));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
